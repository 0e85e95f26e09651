use std::sync::Arc;

use db::DBService;
use services::services::{
    ai::AiService, config::AppConfig, gmb_sync::GmbSyncService, storage::StorageService,
};

use crate::auth::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtService>,
    pub sync: Arc<GmbSyncService>,
    pub ai: Arc<AiService>,
    pub storage: Arc<StorageService>,
}

impl AppState {
    pub fn new(
        db: DBService,
        config: AppConfig,
        jwt: JwtService,
        sync: Arc<GmbSyncService>,
        ai: AiService,
        storage: StorageService,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            sync,
            ai: Arc::new(ai),
            storage: Arc::new(storage),
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn jwt(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt)
    }

    pub fn sync(&self) -> &GmbSyncService {
        &self.sync
    }

    pub fn ai(&self) -> &AiService {
        &self.ai
    }

    pub fn storage(&self) -> &StorageService {
        &self.storage
    }
}
