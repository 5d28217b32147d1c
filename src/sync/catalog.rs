use crate::db::Repository;
use crate::models::Catalog;

use super::remote::RemoteStore;

/// Builtin catalog overlaid with the remote one, or the last cached copy when offline
pub async fn load_catalog(repo: &Repository, remote: Option<&dyn RemoteStore>) -> Catalog {
    let mut catalog = Catalog::default();

    if let Some(remote) = remote {
        match remote.fetch_activities().await {
            Ok(activities) if !activities.is_empty() => {
                if let Err(e) = repo.cache_activities(&activities).await {
                    tracing::warn!("Failed to cache activities: {}", e);
                }
                catalog.merge_remote(activities);
                return catalog;
            }
            Ok(_) => tracing::debug!("Remote catalog is empty"),
            Err(e) => tracing::warn!("Failed to fetch activities, using cache: {}", e),
        }
    }

    match repo.cached_activities().await {
        Ok(cached) => catalog.merge_remote(cached),
        Err(e) => tracing::warn!("Failed to read cached activities: {}", e),
    }
    catalog
}
