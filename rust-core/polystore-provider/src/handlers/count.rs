// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `count`: number of entries in a database. No bulk payload.

use polystore_core::{DatabaseId, KvResult, Mode};

use crate::provider::Provider;

pub async fn count(provider: &Provider, db_id: &DatabaseId, mode: Mode) -> KvResult<u64> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    database.backend().count(mode).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use polystore_backend::BackendRegistry;
    use polystore_core::KvError;

    #[tokio::test]
    async fn test_count_and_unknown_database() {
        let provider = Provider::new(
            ProviderConfig::from_str(r#"{"databases":[{"type":"map","name":"db"}]}"#).unwrap(),
            BackendRegistry::with_defaults(),
        )
        .unwrap();
        let id = provider.find_by_name("db").await.unwrap();
        assert_eq!(count(&provider, &id, Mode::NONE).await.unwrap(), 0);

        let ghost = DatabaseId::generate();
        assert!(matches!(
            count(&provider, &ghost, Mode::NONE).await,
            Err(KvError::InvalidDatabase(_))
        ));
    }
}
