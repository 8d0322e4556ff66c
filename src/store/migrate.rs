use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_listing_owner_index", m002_listing_owner_index),
        ("003_review_payment_index", m003_review_payment_index),
    ]
}

/// Apply every migration newer than the stored schema version.
///
/// Migrations must be idempotent: a crash between running one and recording its
/// version re-runs it on the next start. The version only ever moves forward.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt schema version ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

fn m002_listing_owner_index(store: &Store) -> Result<(), StoreError> {
    let count = store.rebuild_listing_owner_index()?;
    tracing::info!(count, "Rebuilt listing owner index");
    Ok(())
}

/// Backfill the payment index for reviews written before it existed. The first
/// review seen for a payment wins; later duplicates are logged and left unindexed.
fn m003_review_payment_index(store: &Store) -> Result<(), StoreError> {
    for item in store.reviews.iter() {
        let (_, value) = item?;
        let review: crate::store::operations::reviews::Review = Store::deserialize(&value)?;
        let key = crate::store::keys::review_payment_index_key(&review.payment_id);
        let claimed = store.reviews_by_payment.compare_and_swap(
            key.as_bytes(),
            None::<&[u8]>,
            Some(review.id.as_bytes()),
        )?;
        if claimed.is_err() {
            tracing::warn!(
                review_id = %review.id,
                payment_id = %review.payment_id,
                "Duplicate review for payment found during backfill"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 3);
        assert_eq!(second, 3);
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db2");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        set_version(&store, 5).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }

    #[test]
    fn corrupt_version_is_reported() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db3").to_str().unwrap()).unwrap();
        store.meta.insert(VERSION_KEY.as_bytes(), b"12".as_slice()).unwrap();
        assert!(matches!(
            get_current_version(&store),
            Err(StoreError::Migration { .. })
        ));
    }
}
