//! Event Emission Tests
//!
//! Tests that verify correct event emission for all tree mutations.
//! Each successful mutation emits exactly one event after its transaction
//! commits; a rejected mutation emits nothing.

#[cfg(test)]
mod event_emission_tests {
    use anyhow::Result;
    use qbank_core::db::CategoryEvent;
    use qbank_core::{CategoryEngine, CategoryType, CategoryUpdate, EngineConfig, NewCategory};
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::broadcast::Receiver;
    use tokio::time::{timeout, Duration};

    /// Helper to open an engine on a fresh database
    async fn create_test_engine() -> Result<(CategoryEngine, TempDir)> {
        let temp_dir = TempDir::new()?;
        let config = EngineConfig::with_database_path(temp_dir.path().join("test.db"));
        let engine = CategoryEngine::open(config).await?;
        Ok((engine, temp_dir))
    }

    async fn next_event(rx: &mut Receiver<CategoryEvent>) -> CategoryEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event")
    }

    #[tokio::test]
    async fn test_create_emits_created_event() -> Result<()> {
        let (engine, _temp_dir) = create_test_engine().await?;
        let mut rx = engine.mutator().subscribe_to_events();

        let math = engine
            .mutator()
            .create_category(NewCategory::new("Math", "MATH", CategoryType::Subject))
            .await?;

        match next_event(&mut rx).await {
            CategoryEvent::Created { category, .. } => {
                assert_eq!(category.id, math.id);
                assert_eq!(category.code, "MATH");
            }
            other => panic!("Expected Created, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        Ok(())
    }

    #[tokio::test]
    async fn test_move_emits_moved_event_with_subtree() -> Result<()> {
        let (engine, _temp_dir) = create_test_engine().await?;
        let mutator = engine.mutator();

        let left = mutator
            .create_category(NewCategory::new("Left", "LEFT", CategoryType::Subject))
            .await?;
        let right = mutator
            .create_category(NewCategory::new("Right", "RIGHT", CategoryType::Subject))
            .await?;
        let child = mutator
            .create_category(NewCategory::new("Child", "CHILD", CategoryType::Chapter).under(left.id))
            .await?;
        let grandchild = mutator
            .create_category(NewCategory::new("Grandchild", "GRAND", CategoryType::Topic).under(child.id))
            .await?;

        let mut rx = mutator.subscribe_to_events();
        mutator.move_category(child.id, Some(right.id)).await?;

        match next_event(&mut rx).await {
            CategoryEvent::Moved {
                category,
                old_parent_id,
                affected_ids,
                ..
            } => {
                assert_eq!(category.parent_id, Some(right.id));
                assert_eq!(old_parent_id, Some(left.id));
                assert_eq!(affected_ids, vec![child.id, grandchild.id]);
            }
            other => panic!("Expected Moved, got {:?}", other),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_mutations_emit_nothing() -> Result<()> {
        let (engine, _temp_dir) = create_test_engine().await?;
        let mutator = engine.mutator();

        let root = mutator
            .create_category(NewCategory::new("Root", "ROOT", CategoryType::Subject))
            .await?;
        let child = mutator
            .create_category(NewCategory::new("Child", "CHILD", CategoryType::Chapter).under(root.id))
            .await?;

        let mut rx = mutator.subscribe_to_events();

        assert!(mutator.move_category(root.id, Some(child.id)).await.is_err());
        assert!(mutator.delete_category(root.id, false).await.is_err());
        assert!(mutator.reorder_siblings(Some(root.id), &[]).await.is_err());
        // Moving onto the current parent changes nothing
        mutator.move_category(child.id, Some(root.id)).await?;
        // Neither does an empty update
        mutator
            .update_category(child.id, CategoryUpdate::default())
            .await?;

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_each_operation_emits_its_event_type() -> Result<()> {
        let (engine, _temp_dir) = create_test_engine().await?;
        let mutator = engine.mutator().with_client("audit-test");
        let mut rx = mutator.subscribe_to_events();

        let root = mutator
            .create_category(NewCategory::new("Root", "ROOT", CategoryType::Subject))
            .await?;
        let a = mutator
            .create_category(NewCategory::new("A", "A", CategoryType::Chapter).under(root.id))
            .await?;
        let b = mutator
            .create_category(NewCategory::new("B", "B", CategoryType::Chapter).under(root.id))
            .await?;
        mutator.reorder_siblings(Some(root.id), &[b.id, a.id]).await?;
        mutator
            .update_category(
                a.id,
                CategoryUpdate {
                    name: Some("A prime".into()),
                    ..CategoryUpdate::default()
                },
            )
            .await?;
        mutator.delete_category(root.id, true).await?;
        mutator.rebuild_index().await?;

        let mut types = Vec::new();
        for _ in 0..7 {
            let event = next_event(&mut rx).await;
            assert_eq!(event.source_client_id(), Some("audit-test"));
            types.push(event.event_type());
        }

        assert_eq!(
            types,
            vec![
                "category:created",
                "category:created",
                "category:created",
                "category:reordered",
                "category:updated",
                "category:deleted",
                "category:index-rebuilt",
            ]
        );
        Ok(())
    }
}
