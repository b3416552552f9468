use std::collections::HashMap;

use runnel_core::Run;
use uuid::Uuid;

use crate::store::trait_store::{RunStore, StoreError};
use crate::store::types::RunTree;

/// Reads the run `root_id` and all of its descendants back as a tree.
pub async fn load_tree(store: &dyn RunStore, root_id: Uuid) -> Result<RunTree, StoreError> {
    let root = store
        .get_run(root_id)
        .await?
        .ok_or(StoreError::RunNotFound(root_id))?;

    let mut children: HashMap<Uuid, Vec<Run>> = HashMap::new();
    let mut pending = vec![root_id];
    while let Some(parent_id) = pending.pop() {
        let found = store.children_of(parent_id).await?;
        pending.extend(found.iter().map(|run| run.id));
        children.insert(parent_id, found);
    }

    Ok(assemble(root, &mut children))
}

fn assemble(run: Run, children: &mut HashMap<Uuid, Vec<Run>>) -> RunTree {
    let nested = children
        .remove(&run.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| assemble(child, children))
        .collect();
    RunTree {
        run,
        children: nested,
    }
}
