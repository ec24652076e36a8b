//! Work Item Service Tests
//!
//! Integration tests for work item CRUD against the in-memory store.
//!
//! ## Test Coverage
//! - Per-space numbering and top-of-list placement on create
//! - Field conversion failures surfaced as bad parameters
//! - Optimistic concurrency on save and delete
//! - Space scoping of lookups and lists
//! - Criteria filtering and pagination totals
//! - Revision records stamped with the acting identity

#[cfg(test)]
mod work_item_tests {
    use anyhow::Result;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use uuid::Uuid;
    use witrack_core::config::OrderingConfig;
    use witrack_core::criteria::Expression;
    use witrack_core::db::{InMemoryStore, Page};
    use witrack_core::models::{
        planner_item_fields, system, FieldValue, NewWorkItemType, RevisionKind, WorkItemType,
    };
    use witrack_core::services::{
        TrackerError, WorkItemService, WorkItemTypeCache, WorkItemTypeService,
    };

    struct Fixture {
        store: Arc<InMemoryStore>,
        items: WorkItemService,
        space: Uuid,
        wit: WorkItemType,
    }

    async fn setup() -> Result<Fixture> {
        witrack_core::logging::init_tracing("warn");
        let store = Arc::new(InMemoryStore::new());
        let types = WorkItemTypeService::new(store.clone(), Arc::new(WorkItemTypeCache::new()));
        let items = WorkItemService::new(store.clone(), types.clone(), OrderingConfig::default());

        let space = Uuid::new_v4();
        let wit = types
            .create(
                NewWorkItemType::new("bug", space).with_fields(planner_item_fields()),
                None,
            )
            .await?;

        Ok(Fixture {
            store,
            items,
            space,
            wit,
        })
    }

    fn fields(title: &str, state: &str) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert(system::TITLE.to_string(), FieldValue::from(title));
        fields.insert(system::STATE.to_string(), FieldValue::from(state));
        fields
    }

    // ==========================================================================
    // Create / Load
    // ==========================================================================

    #[tokio::test]
    async fn test_create_numbers_and_orders_per_space() -> Result<()> {
        let f = setup().await?;
        let creator = Uuid::new_v4();

        let first = f.items.create(f.space, f.wit.id, fields("one", "new"), creator).await?;
        let second = f.items.create(f.space, f.wit.id, fields("two", "new"), creator).await?;

        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(first.version, 0);
        assert_eq!(first.execution_order, 1000.0);
        assert_eq!(second.execution_order, 2000.0);
        assert_eq!(first.title(), Some("one"));
        assert_eq!(
            first.field(system::CREATOR),
            &FieldValue::String(creator.to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_load_round_trips_fields() -> Result<()> {
        let f = setup().await?;
        let created = f
            .items
            .create(f.space, f.wit.id, fields("Crash on save", "open"), Uuid::new_v4())
            .await?;

        let loaded = f.items.load(f.space, created.id).await?;

        assert_eq!(loaded, created);
        assert_eq!(loaded.field(system::STATE), &FieldValue::from("open"));
        assert!(loaded.field(system::ITERATION).is_null());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_from_other_space_is_not_found() -> Result<()> {
        let f = setup().await?;
        let created = f
            .items
            .create(f.space, f.wit.id, fields("hidden", "new"), Uuid::new_v4())
            .await?;

        let err = f.items.load(Uuid::new_v4(), created.id).await.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_required_title_rejected() -> Result<()> {
        let f = setup().await?;
        let mut values = fields("x", "new");
        values.remove(system::TITLE);

        let err = f
            .items
            .create(f.space, f.wit.id, values, Uuid::new_v4())
            .await
            .unwrap_err();

        match err {
            TrackerError::BadParameter { parameter, reason } => {
                assert_eq!(parameter, system::TITLE);
                assert!(reason.contains("value required"));
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_disallowed_state_and_unknown_field_rejected() -> Result<()> {
        let f = setup().await?;

        let err = f
            .items
            .create(f.space, f.wit.id, fields("x", "on fire"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_bad_parameter());

        let mut values = fields("x", "new");
        values.insert("custom.colour".into(), FieldValue::from("red"));
        let err = f
            .items
            .create(f.space, f.wit.id, values, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_bad_parameter());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_with_type_from_other_space_rejected() -> Result<()> {
        let f = setup().await?;
        let err = f
            .items
            .create(Uuid::new_v4(), f.wit.id, fields("x", "new"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_bad_parameter());

        let err = f
            .items
            .create(f.space, Uuid::new_v4(), fields("x", "new"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_bad_parameter());
        Ok(())
    }

    // ==========================================================================
    // Save / Delete (optimistic concurrency)
    // ==========================================================================

    #[tokio::test]
    async fn test_save_bumps_version() -> Result<()> {
        let f = setup().await?;
        let mut item = f
            .items
            .create(f.space, f.wit.id, fields("draft", "new"), Uuid::new_v4())
            .await?;

        item.set_field(system::TITLE, "final");
        item.set_field(system::STATE, "resolved");
        let saved = f.items.save(f.space, &item, Uuid::new_v4()).await?;

        assert_eq!(saved.version, 1);
        assert_eq!(saved.title(), Some("final"));
        assert_eq!(saved.number, item.number);
        assert_eq!(saved.execution_order, item.execution_order);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_save_is_version_conflict() -> Result<()> {
        let f = setup().await?;
        let item = f
            .items
            .create(f.space, f.wit.id, fields("draft", "new"), Uuid::new_v4())
            .await?;

        let mut first = item.clone();
        first.set_field(system::TITLE, "first writer");
        f.items.save(f.space, &first, Uuid::new_v4()).await?;

        let mut second = item;
        second.set_field(system::TITLE, "second writer");
        let err = f.items.save(f.space, &second, Uuid::new_v4()).await.unwrap_err();

        match err {
            TrackerError::VersionConflict {
                expected_version,
                actual_version,
                ..
            } => {
                assert_eq!(expected_version, 0);
                assert_eq!(actual_version, 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        let stored = f.items.load(f.space, first.id).await?;
        assert_eq!(stored.title(), Some("first writer"));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_then_load_is_not_found() -> Result<()> {
        let f = setup().await?;
        let item = f
            .items
            .create(f.space, f.wit.id, fields("doomed", "new"), Uuid::new_v4())
            .await?;

        let err = f
            .items
            .delete(f.space, item.id, item.version + 5, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());

        f.items
            .delete(f.space, item.id, item.version, Uuid::new_v4())
            .await?;

        assert!(f.items.load(f.space, item.id).await.unwrap_err().is_not_found());
        assert!(f
            .items
            .save(f.space, &item, Uuid::new_v4())
            .await
            .unwrap_err()
            .is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_numbers_not_reused_after_delete() -> Result<()> {
        let f = setup().await?;
        let first = f
            .items
            .create(f.space, f.wit.id, fields("one", "new"), Uuid::new_v4())
            .await?;
        f.items
            .delete(f.space, first.id, first.version, Uuid::new_v4())
            .await?;

        let second = f
            .items
            .create(f.space, f.wit.id, fields("two", "new"), Uuid::new_v4())
            .await?;
        assert_eq!(second.number, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_revisions_record_modifier() -> Result<()> {
        let f = setup().await?;
        let (creator, editor) = (Uuid::new_v4(), Uuid::new_v4());

        let mut item = f
            .items
            .create(f.space, f.wit.id, fields("audited", "new"), creator)
            .await?;
        item.set_field(system::STATE, "open");
        let item = f.items.save(f.space, &item, editor).await?;
        f.items.delete(f.space, item.id, item.version, editor).await?;

        let revisions = f.store.revisions().await;
        let kinds: Vec<RevisionKind> = revisions.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RevisionKind::Create, RevisionKind::Update, RevisionKind::Delete]
        );
        assert_eq!(revisions[0].modifier, creator);
        assert_eq!(revisions[1].modifier, editor);
        assert!(revisions[2].fields.is_none());
        Ok(())
    }

    // ==========================================================================
    // List
    // ==========================================================================

    #[tokio::test]
    async fn test_list_filters_by_state_highest_order_first() -> Result<()> {
        let f = setup().await?;
        let creator = Uuid::new_v4();
        for (title, state) in [("a", "open"), ("b", "closed"), ("c", "open")] {
            f.items.create(f.space, f.wit.id, fields(title, state), creator).await?;
        }

        let criteria = Expression::equals(
            Expression::field(system::STATE),
            Expression::literal("open"),
        );
        let (items, total) = f.items.list(f.space, Some(criteria), Page::default()).await?;

        assert_eq!(total, 2);
        let titles: Vec<_> = items.iter().filter_map(|i| i.title()).collect();
        assert_eq!(titles, vec!["c", "a"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_space() -> Result<()> {
        let f = setup().await?;
        f.items
            .create(f.space, f.wit.id, fields("mine", "new"), Uuid::new_v4())
            .await?;

        let (items, total) = f.items.list(Uuid::new_v4(), None, Page::default()).await?;
        assert!(items.is_empty());
        assert_eq!(total, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination_past_end_keeps_total() -> Result<()> {
        let f = setup().await?;
        for i in 0..5 {
            f.items
                .create(f.space, f.wit.id, fields(&format!("item {i}"), "new"), Uuid::new_v4())
                .await?;
        }

        let (page, total) = f.items.list(f.space, None, Page::new(2, 2)).await?;
        assert_eq!(page.len(), 2);
        assert_eq!(total, 5);
        assert_eq!(page[0].number, 3);

        let (page, total) = f.items.list(f.space, None, Page::new(10, 2)).await?;
        assert!(page.is_empty());
        assert_eq!(total, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_with_quoted_field_name_is_bad_parameter() -> Result<()> {
        let f = setup().await?;
        let criteria = Expression::equals(
            Expression::field("sys'tem"),
            Expression::literal("x"),
        );
        let err = f
            .items
            .list(f.space, Some(criteria), Page::default())
            .await
            .unwrap_err();
        match err {
            TrackerError::BadParameter { parameter, .. } => assert_eq!(parameter, "criteria"),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }
}
