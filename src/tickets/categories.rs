use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: &'static str,
    pub display_name: &'static str,
    pub emoji: &'static str,
    pub accent_color: u32,
    pub illustration_url: &'static str,
    pub description: &'static str,
}

static CATEGORIES: [Category; 5] = [
    Category {
        id: "suporte",
        display_name: "Suporte",
        emoji: "🔧",
        accent_color: 0xff5555,
        illustration_url: "https://i.imgur.com/exemplo_suporte.png",
        description: "Solicite ajuda com problemas técnicos gerais",
    },
    Category {
        id: "sistema",
        display_name: "Sistema",
        emoji: "💻",
        accent_color: 0x55ff55,
        illustration_url: "https://i.imgur.com/exemplo_sistema.png",
        description: "Problemas relacionados ao nosso sistema",
    },
    Category {
        id: "mikrotik",
        display_name: "Mikrotik",
        emoji: "📡",
        accent_color: 0x5555ff,
        illustration_url: "https://i.imgur.com/exemplo_mikrotik.png",
        description: "Suporte específico para equipamentos Mikrotik",
    },
    Category {
        id: "duvida",
        display_name: "Dúvida",
        emoji: "❓",
        accent_color: 0xffff55,
        illustration_url: "https://i.imgur.com/exemplo_duvida.png",
        description: "Tire suas dúvidas sobre nossos serviços",
    },
    Category {
        id: "outros",
        display_name: "Outros",
        emoji: "📌",
        accent_color: 0xff55ff,
        illustration_url: "https://i.imgur.com/exemplo_outros.png",
        description: "Outros assuntos não listados nas categorias acima",
    },
];

pub fn resolve(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.id == id)
}

/// Categories in declared order; every call starts a fresh pass.
pub fn list_all() -> impl Iterator<Item = &'static Category> + Clone {
    CATEGORIES.iter()
}
