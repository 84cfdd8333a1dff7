#[cfg(test)]
mod ticket_lifecycle_tests {
    use helpdesk_bot::channels::{
        ChannelId, ChannelKind, ChatPlatform, Member, MessageReceived, OverwriteTarget,
        Permission, RoleId, UserId,
    };
    use helpdesk_bot::tests::test_util::{
        setup, staff_member, test_settings, FailPoint, RecordingPlatform, GUILD_ID, LOG_CHANNEL,
        STAFF_ROLE, TICKET_PARENT,
    };
    use helpdesk_bot::tickets::lifecycle::TicketController;
    use helpdesk_bot::tickets::{
        CloseOutcome, CreateTicketRequest, MessageCapture, TicketDirectory, TicketError,
        TicketStatus, TranscriptStore,
    };
    use helpdesk_bot::{assert_err, assert_ok};
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        platform: Arc<RecordingPlatform>,
        controller: Arc<TicketController>,
        capture: MessageCapture,
        owner: Member,
    }

    fn harness(grace: Duration) -> Harness {
        setup();
        let platform = Arc::new(RecordingPlatform::new());
        let owner = Member::new("u1", "Ana");
        platform.add_member(owner.clone());

        let shared: Arc<dyn ChatPlatform> = platform.clone();
        let transcripts = Arc::new(TranscriptStore::new());
        let controller = Arc::new(TicketController::new(
            shared,
            Arc::new(TicketDirectory::new()),
            Arc::clone(&transcripts),
            test_settings(grace),
        ));
        Harness {
            platform,
            controller,
            capture: MessageCapture::new(transcripts),
            owner,
        }
    }

    fn request(owner: &Member, category: &str, description: &str) -> CreateTicketRequest {
        CreateTicketRequest {
            owner: owner.clone(),
            category_id: category.to_string(),
            description: description.to_string(),
        }
    }

    fn said(channel: &ChannelId, author: &Member, content: &str) -> MessageReceived {
        MessageReceived {
            channel_id: channel.clone(),
            author_id: author.id.clone(),
            author_tag: author.tag.clone(),
            is_bot: false,
            content: content.to_string(),
            attachment_urls: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_ticket_provisions_private_channels() {
        let h = harness(Duration::ZERO);

        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "mikrotik", "  Meu roteador reinicia sozinho  "))
                .await
        );

        let text = ticket.channel.clone().unwrap();
        let voice = ticket.voice_channel.clone().unwrap();
        assert_eq!(text.name, "ticket-ana");
        assert_eq!(voice.name, "🔊︱Mikrotik-Ana");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.category.id, "mikrotik");

        let specs = h.platform.created_channels();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].kind, ChannelKind::Text);
        assert_eq!(specs[1].kind, ChannelKind::Voice);
        for spec in &specs {
            assert_eq!(spec.parent, Some(ChannelId::new(TICKET_PARENT)));
            let everyone = &spec.overwrites[0];
            assert_eq!(everyone.target, OverwriteTarget::Role(RoleId::new(GUILD_ID)));
            assert!(everyone.deny.contains(&Permission::ViewChannel));
            assert!(spec
                .overwrites
                .iter()
                .any(|o| o.target == OverwriteTarget::Member(h.owner.id.clone())));
            assert!(spec
                .overwrites
                .iter()
                .any(|o| o.target == OverwriteTarget::Role(RoleId::new(STAFF_ROLE))));
        }

        let intro = h.platform.messages_to(&text.id);
        assert_eq!(intro.len(), 1);
        assert_eq!(
            intro[0].content.as_deref(),
            Some(format!("<@u1> <@&{STAFF_ROLE}>").as_str())
        );
        let embed = &intro[0].embeds[0];
        assert!(embed
            .fields
            .iter()
            .any(|f| f.value == "Meu roteador reinicia sozinho"));
        assert_eq!(intro[0].components[0][0].custom_id, "ticket_close");

        assert_eq!(h.platform.messages_to(&ChannelId::new(LOG_CHANNEL)).len(), 1);

        let found = h.controller.directory().find(&text.id).await.unwrap();
        assert_eq!(found.owner, h.owner.id);
        assert!(h.controller.transcripts().is_open(&text.id).await);
    }

    #[tokio::test]
    async fn test_second_ticket_for_same_owner_conflicts() {
        let h = harness(Duration::ZERO);
        let first = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );

        let err = assert_err!(
            h.controller
                .create_ticket(request(&h.owner, "duvida", "Outra pergunta qualquer"))
                .await
        );
        match err {
            TicketError::Conflict { existing } => assert_eq!(existing, first.channel),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(h.platform.created_channels().len(), 2);
        assert!(h.controller.check_eligibility(&h.owner.id).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_requests_touch_nothing() {
        let h = harness(Duration::ZERO);

        let err = assert_err!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "curto"))
                .await
        );
        assert!(matches!(err, TicketError::Validation(_)));

        let err = assert_err!(
            h.controller
                .create_ticket(request(&h.owner, "impressora", "A impressora parou"))
                .await
        );
        assert!(matches!(err, TicketError::UnknownCategory(id) if id == "impressora"));

        assert!(h.platform.calls().is_empty());
        assert!(h.controller.directory().is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_yield_one_ticket() {
        let h = harness(Duration::ZERO);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&h.controller);
                let owner = h.owner.clone();
                tokio::spawn(async move {
                    controller
                        .create_ticket(request(&owner, "sistema", "O sistema não abre"))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(TicketError::Conflict { .. }) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(h.controller.directory().len().await, 1);
        assert_eq!(h.platform.created_channels().len(), 2);
    }

    #[tokio::test]
    async fn test_voice_failure_rolls_back() {
        let h = harness(Duration::ZERO);
        h.platform.fail(FailPoint::CreateVoice);

        let err = assert_err!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        assert!(matches!(err, TicketError::Provisioning(_)));

        assert_eq!(h.platform.deleted_channels(), [ChannelId::new("chan-1")]);
        assert!(h.platform.live_channels().is_empty());
        assert!(h.controller.directory().is_empty().await);
        assert_eq!(h.controller.transcripts().open_count().await, 0);
        assert_ok!(h.controller.check_eligibility(&h.owner.id).await);
    }

    #[tokio::test]
    async fn test_log_failure_rolls_back_in_reverse_order() {
        let h = harness(Duration::ZERO);
        h.platform.fail(FailPoint::SendTo(ChannelId::new(LOG_CHANNEL)));

        let err = assert_err!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        assert!(matches!(err, TicketError::Provisioning(_)));
        assert_eq!(
            h.platform.deleted_channels(),
            [ChannelId::new("chan-2"), ChannelId::new("chan-1")]
        );
        assert!(h.controller.directory().is_empty().await);
        assert_eq!(h.controller.transcripts().open_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_delivers_transcript_and_tears_down() {
        let h = harness(Duration::ZERO);
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();
        let staff = staff_member("s1", "Bruno");

        assert!(h.capture.on_message(&said(&channel, &h.owner, "Olá?")).await);
        assert!(h.capture.on_message(&said(&channel, &staff, "Oi, vou verificar")).await);

        let closed = assert_ok!(h.controller.close_now(&channel, &staff.tag).await);
        assert!(closed.delivery_failures.is_empty());
        assert!(closed.teardown_failures.is_empty());
        assert_eq!(closed.ticket.status, TicketStatus::Closed);

        let transcript = &closed.transcript;
        assert!(transcript.starts_with("=== TICKET TRANSCRIPT ===\n\nChannel: ticket-ana\n"));
        assert!(transcript.contains("Closed by: Bruno\n"));
        let ana = transcript.find("] Ana: Olá?").unwrap();
        let bruno = transcript.find("] Bruno: Oi, vou verificar").unwrap();
        assert!(ana < bruno);

        let dms = h.platform.direct_messages_to(&h.owner.id);
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].attachments[0].filename, "transcript-ticket-ana.txt");
        assert_eq!(dms[0].attachments[0].content, transcript.as_bytes());

        let log = h.platform.messages_to(&ChannelId::new(LOG_CHANNEL));
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].attachments[0].content, transcript.as_bytes());

        assert_eq!(
            h.platform.deleted_channels(),
            [ChannelId::new("chan-2"), ChannelId::new("chan-1")]
        );
        assert!(h.controller.directory().find(&channel).await.is_none());
        assert!(!h.controller.transcripts().is_open(&channel).await);
        assert!(!h.capture.on_message(&said(&channel, &h.owner, "ainda aí?")).await);
        assert_ok!(h.controller.check_eligibility(&h.owner.id).await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let h = harness(Duration::ZERO);
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "outros", "Preciso de um orçamento"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();

        assert_ok!(h.controller.close_now(&channel, "Ana").await);
        let err = assert_err!(h.controller.close_now(&channel, "Ana").await);
        assert!(matches!(err, TicketError::NotATicket(_)));

        let err = assert_err!(h.controller.close_now(&ChannelId::new("general"), "Ana").await);
        assert!(matches!(err, TicketError::NotATicket(_)));

        assert_eq!(h.platform.direct_messages_to(&h.owner.id).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_direct_message_does_not_block_close() {
        let h = harness(Duration::ZERO);
        h.platform.fail(FailPoint::DirectMessage(h.owner.id.clone()));
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();

        let closed = assert_ok!(h.controller.close_now(&channel, "Ana").await);
        assert_eq!(closed.delivery_failures.len(), 1);
        assert!(matches!(closed.delivery_failures[0], TicketError::Delivery(_)));
        assert_eq!(h.platform.messages_to(&ChannelId::new(LOG_CHANNEL)).len(), 2);
        assert!(h.controller.directory().is_empty().await);
        assert!(h.platform.live_channels().is_empty());
    }

    #[tokio::test]
    async fn test_departed_owner_is_a_delivery_failure() {
        let h = harness(Duration::ZERO);
        let stranger = Member::new("u9", "Carla");
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&stranger, "duvida", "Como troco minha senha?"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();

        let closed = assert_ok!(h.controller.close_now(&channel, "Carla").await);
        assert_eq!(closed.delivery_failures.len(), 1);
        assert!(h.platform.direct_messages_to(&stranger.id).is_empty());
        assert!(h.controller.directory().is_empty().await);
    }

    #[tokio::test]
    async fn test_teardown_failure_is_reported_after_release() {
        let h = harness(Duration::ZERO);
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();
        h.platform.fail(FailPoint::Delete(channel.clone()));

        let closed = assert_ok!(h.controller.close_now(&channel, "Ana").await);
        assert_eq!(closed.teardown_failures.len(), 1);
        assert!(matches!(closed.teardown_failures[0], TicketError::Teardown(_)));
        assert!(h.controller.directory().is_empty().await);
    }

    #[tokio::test]
    async fn test_channels_deleted_elsewhere_are_not_failures() {
        let h = harness(Duration::ZERO);
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();
        h.platform.remove_channel_externally(&channel);

        let closed = assert_ok!(h.controller.close_now(&channel, "Ana").await);
        assert!(closed.teardown_failures.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_close_runs_after_grace() {
        let h = harness(Duration::ZERO);
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();

        let handle = match h.controller.request_close(&channel, &h.owner).await {
            CloseOutcome::Scheduled(handle) => handle,
            other => panic!("close was not scheduled: {other:?}"),
        };
        handle.await.unwrap();

        let countdown = h.platform.messages_to(&channel);
        assert_eq!(
            countdown[1].content.as_deref(),
            Some("🔒 This ticket will be closed in 0 seconds...")
        );
        assert!(h.controller.directory().find(&channel).await.is_none());
        assert_eq!(h.controller.pending_close_count().await, 0);
        assert_eq!(h.platform.direct_messages_to(&h.owner.id).len(), 1);
    }

    #[tokio::test]
    async fn test_messages_during_grace_reach_transcript() {
        let h = harness(Duration::from_millis(200));
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();
        let staff = staff_member("s1", "Bruno");

        let handle = match h.controller.request_close(&channel, &staff).await {
            CloseOutcome::Scheduled(handle) => handle,
            other => panic!("close was not scheduled: {other:?}"),
        };
        assert!(
            h.capture
                .on_message(&said(&channel, &h.owner, "Espera, mais uma coisa!"))
                .await
        );
        let status = h.controller.directory().find(&channel).await.unwrap().status;
        assert_eq!(status, TicketStatus::Closing);

        handle.await.unwrap();

        let dms = h.platform.direct_messages_to(&h.owner.id);
        assert_eq!(dms.len(), 1);
        let file = &dms[0].attachments[0];
        assert_eq!(file.filename, "transcript-ticket-ana.txt");
        let text = String::from_utf8(file.content.clone()).unwrap();
        assert!(text.contains("] Ana: Espera, mais uma coisa!\n"));
        assert!(text.contains("Closed by: Bruno\n"));
        assert!(h.controller.directory().find(&channel).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_close_requests() {
        let h = harness(Duration::from_secs(60));
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();

        let first = h.controller.request_close(&channel, &h.owner).await;
        assert!(first.is_scheduled());
        let second = h
            .controller
            .request_close(&channel, &staff_member("s1", "Bruno"))
            .await;
        assert!(matches!(second, CloseOutcome::AlreadyClosing));

        let status = h.controller.directory().find(&channel).await.unwrap().status;
        assert_eq!(status, TicketStatus::Closing);

        // Closing right away supersedes the pending timer.
        assert_ok!(h.controller.close_now(&channel, "Bruno").await);
        if let CloseOutcome::Scheduled(handle) = first {
            handle.await.unwrap();
        }
        assert_eq!(h.platform.direct_messages_to(&h.owner.id).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_close_keeps_ticket_open() {
        let h = harness(Duration::from_secs(60));
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();

        let handle = match h.controller.request_close(&channel, &h.owner).await {
            CloseOutcome::Scheduled(handle) => handle,
            other => panic!("close was not scheduled: {other:?}"),
        };
        assert!(h.controller.cancel_close(&channel, &h.owner).await);
        handle.await.unwrap();

        let found = h.controller.directory().find(&channel).await.unwrap();
        assert_eq!(found.status, TicketStatus::Open);
        assert_eq!(h.controller.pending_close_count().await, 0);
        assert!(h.platform.deleted_channels().is_empty());
        assert!(h.controller.transcripts().is_open(&channel).await);

        assert!(!h.controller.cancel_close(&channel, &h.owner).await);
        assert!(h.controller.request_close(&channel, &h.owner).await.is_scheduled());
    }

    #[tokio::test]
    async fn test_only_owner_or_staff_may_close() {
        let h = harness(Duration::from_secs(60));
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let channel = ticket.channel_id().unwrap().clone();

        let outsider = Member::new("u2", "Davi");
        let outcome = h.controller.request_close(&channel, &outsider).await;
        assert!(matches!(outcome, CloseOutcome::Forbidden));

        let outcome = h
            .controller
            .request_close(&ChannelId::new("general"), &h.owner)
            .await;
        assert!(matches!(outcome, CloseOutcome::NotATicket));

        let outcome = h
            .controller
            .request_close(&channel, &staff_member("s1", "Bruno"))
            .await;
        assert!(outcome.is_scheduled());
        assert!(!h.controller.cancel_close(&channel, &outsider).await);
        assert_eq!(h.controller.pending_close_count().await, 1);
    }

    #[tokio::test]
    async fn test_setup_posts_picker() {
        let h = harness(Duration::ZERO);
        let target = ChannelId::new("panel");

        assert_ok!(h.controller.setup(&target).await);
        let posted = h.platform.messages_to(&target);
        assert_eq!(posted.len(), 1);
        let buttons: usize = posted[0].components.iter().map(Vec::len).sum();
        assert_eq!(buttons, 5);

        h.platform.fail(FailPoint::SendTo(target.clone()));
        let err = assert_err!(h.controller.setup(&target).await);
        assert!(matches!(err, TicketError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_user_ids_resolve_to_owner() {
        let h = harness(Duration::ZERO);
        let ticket = assert_ok!(
            h.controller
                .create_ticket(request(&h.owner, "suporte", "Internet caiu de novo"))
                .await
        );
        let by_owner = h
            .controller
            .directory()
            .find_by_owner(&UserId::new("u1"))
            .await
            .unwrap();
        assert_eq!(by_owner.channel, ticket.channel);
    }
}
