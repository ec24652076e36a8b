//! Work Item Type Inheritance Tests
//!
//! Integration tests for `WorkItemTypeService`: field inheritance, materialized
//! type paths, and the type cache.

#[cfg(test)]
mod type_inheritance_tests {
    use anyhow::Result;
    use std::sync::Arc;
    use uuid::Uuid;
    use witrack_core::db::InMemoryStore;
    use witrack_core::models::{
        planner_item_fields, safe_id, system, FieldDefinition, FieldType, Kind, NewWorkItemType,
        WorkItemType,
    };
    use witrack_core::services::{TrackerError, WorkItemTypeCache, WorkItemTypeService};

    async fn setup() -> Result<(WorkItemTypeService, WorkItemType)> {
        let store = Arc::new(InMemoryStore::new());
        let service = WorkItemTypeService::new(store, Arc::new(WorkItemTypeCache::new()));
        let base = service
            .create(
                NewWorkItemType::new("planneritem", Uuid::new_v4())
                    .with_fields(planner_item_fields()),
                None,
            )
            .await?;
        Ok((service, base))
    }

    #[tokio::test]
    async fn test_subtype_inherits_fields_and_extends_path() -> Result<()> {
        let (service, base) = setup().await?;

        let bug = service
            .create(
                NewWorkItemType::new("bug", base.space_id).with_field(
                    "bug.severity",
                    FieldDefinition::new("Severity", FieldType::simple(Kind::Integer)),
                ),
                Some(base.id),
            )
            .await?;

        assert_eq!(bug.fields.len(), base.fields.len() + 1);
        assert!(bug.field(system::TITLE).is_some());
        assert!(bug.field("bug.severity").is_some());
        assert_eq!(
            bug.path.as_str(),
            format!("{}.{}", safe_id(base.id), safe_id(bug.id))
        );
        assert_eq!(bug.extended_type_id, Some(base.id));

        assert!(service.is_subtype_of(bug.id, base.id).await?);
        assert!(service.is_subtype_of(bug.id, bug.id).await?);
        assert!(!service.is_subtype_of(base.id, bug.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_grandchild_is_subtype_of_root() -> Result<()> {
        let (service, base) = setup().await?;
        let bug = service
            .create(NewWorkItemType::new("bug", base.space_id), Some(base.id))
            .await?;
        let regression = service
            .create(NewWorkItemType::new("regression", base.space_id), Some(bug.id))
            .await?;

        assert_eq!(regression.path.depth(), 3);
        assert!(service.is_subtype_of(regression.id, base.id).await?);
        assert_eq!(regression.fields, base.fields);
        Ok(())
    }

    #[tokio::test]
    async fn test_compatible_override_is_accepted() -> Result<()> {
        let (service, base) = setup().await?;
        let inherited = base.field(system::TITLE).cloned().unwrap();

        let story = service
            .create(
                NewWorkItemType::new("story", base.space_id)
                    .with_field(system::TITLE, inherited.with_description("Story headline")),
                Some(base.id),
            )
            .await?;

        assert_eq!(
            story.field(system::TITLE).map(|d| d.description.as_str()),
            Some("Story headline")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_incompatible_override_rejected_and_not_stored() -> Result<()> {
        let (service, base) = setup().await?;

        let err = service
            .create(
                NewWorkItemType::new("sloppy", base.space_id).with_field(
                    system::TITLE,
                    FieldDefinition::new("Title", FieldType::simple(Kind::String)),
                ),
                Some(base.id),
            )
            .await
            .unwrap_err();

        assert!(err.is_bad_parameter(), "unexpected error: {err}");
        assert_eq!(service.list(base.space_id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_or_foreign_base_rejected() -> Result<()> {
        let (service, base) = setup().await?;

        let err = service
            .create(NewWorkItemType::new("orphan", base.space_id), Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::BadParameter { .. }));

        let err = service
            .create(NewWorkItemType::new("foreign", Uuid::new_v4()), Some(base.id))
            .await
            .unwrap_err();
        assert!(err.is_bad_parameter());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_name_rejected() -> Result<()> {
        let (service, base) = setup().await?;
        let err = service
            .create(NewWorkItemType::new("  ", base.space_id), None)
            .await
            .unwrap_err();
        assert!(err.is_bad_parameter());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_unknown_type_is_not_found() -> Result<()> {
        let (service, _) = setup().await?;
        assert!(service.load(Uuid::new_v4()).await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_loads_are_served_from_cache_until_create() -> Result<()> {
        let (service, base) = setup().await?;

        service.load(base.id).await?;
        service.load(base.id).await?;
        let stats = service.cache().stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);

        service
            .create(NewWorkItemType::new("epic", base.space_id), None)
            .await?;
        assert_eq!(service.cache().stats().await.entries, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_orders_by_path() -> Result<()> {
        let (service, base) = setup().await?;
        let bug = service
            .create(NewWorkItemType::new("bug", base.space_id), Some(base.id))
            .await?;

        let types = service.list(base.space_id).await?;
        let ids: Vec<Uuid> = types.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![base.id, bug.id]);
        assert!(service.list(Uuid::new_v4()).await?.is_empty());
        Ok(())
    }
}
