use super::StoredContent;
use crate::storage::{StorageError, StorageNode};
use tracing::info;

/// Pin `reference` (a wrapping directory) and resolve its single entry
pub async fn pin_and_resolve(
    node: &dyn StorageNode,
    reference: &str,
) -> Result<StoredContent, StorageError> {
    node.pin_add(reference).await?;

    let links = node.list_links(reference).await?;
    let [link] = links.as_slice() else {
        return Err(StorageError::MalformedLinks {
            reference: reference.to_string(),
            detail: format!("expected exactly one link, found {}", links.len()),
        });
    };

    let pinned = StoredContent {
        reference: format!("{}/{}", link.hash, reference),
        length: link.size,
    };

    info!(reference, pinned = %pinned.reference, length = pinned.length, "Pinned");

    Ok(pinned)
}
