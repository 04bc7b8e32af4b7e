//! The SDK coordinator: owns every registered feature and the shared context

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use spool_core::{
    DataEncryption, DateProvider, SdkContext, SystemDateProvider, Telemetry, TrackingConsent, TracingTelemetry,
    Writer,
};
use spool_storage::{Directory, FeatureStorage, FeatureStorageConfig, MetricsData};
use spool_upload::{DataUploadWorker, DataUploader, HttpClient, ReqwestHttpClient, UploadError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::SdkConfig;
use crate::error::{SdkError, SdkResult};
use crate::feature::{FeatureConfig, FeatureHandle};
use crate::preset::PerformancePreset;

struct RegisteredFeature {
    handle: FeatureHandle,
    worker: Arc<DataUploadWorker>,
}

/// Builder for [`SpoolCore`], for replacing the default HTTP client, clock
/// or telemetry
pub struct SpoolCoreBuilder {
    config: SdkConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    date_provider: Arc<dyn DateProvider>,
    telemetry: Arc<dyn Telemetry>,
}

impl SpoolCoreBuilder {
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_date_provider(mut self, date_provider: Arc<dyn DateProvider>) -> Self {
        self.date_provider = date_provider;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Validate the configuration and create the instance directory
    pub fn build(self) -> SdkResult<SpoolCore> {
        self.config.validate()?;
        let encryption = self
            .config
            .encryption()?
            .map(|e| Arc::new(e) as Arc<dyn DataEncryption>);
        let http_client = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::new().map_err(UploadError::from)?),
        };
        let root = Directory::create(self.config.instance_dir())?;
        let (context_tx, _) = watch::channel(self.config.initial_context());

        info!(
            path = %root.path().display(),
            consent = %self.config.tracking_consent,
            "SDK core created"
        );
        Ok(SpoolCore {
            performance: self.config.performance_preset(),
            config: self.config,
            root,
            context_tx,
            features: DashMap::new(),
            http_client,
            date_provider: self.date_provider,
            telemetry: self.telemetry,
            encryption,
            stopped: AtomicBool::new(false),
        })
    }
}

/// Coordinates the features of one SDK instance.
///
/// Every feature gets its own storage under
/// `<storage_dir>/<instance_name>/<feature>` and its own upload worker.
/// They share the [`SdkContext`], which carries the tracking consent.
pub struct SpoolCore {
    config: SdkConfig,
    performance: PerformancePreset,
    root: Directory,
    context_tx: watch::Sender<SdkContext>,
    features: DashMap<String, RegisteredFeature>,
    http_client: Arc<dyn HttpClient>,
    date_provider: Arc<dyn DateProvider>,
    telemetry: Arc<dyn Telemetry>,
    encryption: Option<Arc<dyn DataEncryption>>,
    stopped: AtomicBool,
}

impl SpoolCore {
    /// Create a core with the default HTTP client, system clock and
    /// `tracing` telemetry
    pub fn new(config: SdkConfig) -> SdkResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: SdkConfig) -> SpoolCoreBuilder {
        SpoolCoreBuilder {
            config,
            http_client: None,
            date_provider: Arc::new(SystemDateProvider),
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Register a feature and start its upload worker.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(feature = %feature.name))]
    pub fn register_feature(&self, feature: FeatureConfig) -> SdkResult<FeatureHandle> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SdkError::Stopped);
        }
        let entry = match self.features.entry(feature.name.clone()) {
            Entry::Occupied(_) => return Err(SdkError::FeatureAlreadyRegistered(feature.name)),
            Entry::Vacant(entry) => entry,
        };

        let preset = match &feature.performance_override {
            Some(overrides) => self.performance.updated(overrides),
            None => self.performance,
        };
        let mut storage_config = FeatureStorageConfig::new(&feature.name)
            .with_preset(preset.storage)
            .with_metrics(MetricsData {
                track_name: feature.name.clone(),
                min_upload_delay: preset.upload.min_delay,
                max_upload_delay: preset.upload.max_delay,
            });
        if let Some(encryption) = &self.encryption {
            storage_config = storage_config.with_encryption(encryption.clone());
        }
        let storage = FeatureStorage::open(
            &self.root,
            storage_config,
            self.date_provider.clone(),
            self.telemetry.clone(),
        )?;

        let worker = Arc::new(DataUploadWorker::new(
            feature.name.clone(),
            storage.clone(),
            DataUploader::new(self.http_client.clone(), feature.request_builder),
            feature.upload_conditions,
            self.context_tx.subscribe(),
            &preset.upload,
            self.telemetry.clone(),
        ));
        worker.start()?;

        let handle = FeatureHandle::new(storage, self.context_tx.subscribe());
        entry.insert(RegisteredFeature {
            handle: handle.clone(),
            worker,
        });
        debug!("Feature registered");
        Ok(handle)
    }

    /// Handle of a registered feature
    pub fn feature(&self, name: &str) -> SdkResult<FeatureHandle> {
        self.features
            .get(name)
            .map(|feature| feature.handle.clone())
            .ok_or_else(|| SdkError::FeatureNotFound(name.to_string()))
    }

    /// Consent-following writer of a registered feature
    pub fn writer(&self, name: &str) -> SdkResult<Arc<dyn Writer>> {
        Ok(self.feature(name)?.writer())
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|feature| feature.key().clone()).collect()
    }

    /// Current context snapshot
    pub fn context(&self) -> SdkContext {
        self.context_tx.borrow().clone()
    }

    /// Change the shared context. Upload cycles pick the change up on their
    /// next request.
    pub fn update_context(&self, update: impl FnOnce(&mut SdkContext)) {
        self.context_tx.send_modify(update);
    }

    pub fn tracking_consent(&self) -> TrackingConsent {
        self.context_tx.borrow().tracking_consent
    }

    /// Change the tracking consent.
    ///
    /// Data collected while consent was pending is uploaded on `Granted`
    /// and deleted on `NotGranted`. Writes made before this call are
    /// resolved with the data they were written alongside.
    #[instrument(skip(self))]
    pub fn set_tracking_consent(&self, consent: TrackingConsent) {
        let changed = self.context_tx.send_if_modified(|context| {
            if context.tracking_consent == consent {
                return false;
            }
            context.tracking_consent = consent;
            true
        });
        if !changed {
            return;
        }
        for feature in self.features.iter() {
            feature.handle.storage().migrate_unauthorized_data(consent);
        }
        info!("Tracking consent changed");
    }

    /// Delete all data stored by every feature, uploaded or not
    #[instrument(skip(self))]
    pub fn clear_all_data(&self) {
        for feature in self.features.iter() {
            feature.handle.storage().clear_all_data();
        }
        debug!("Cleared all data");
    }

    /// Wait until every write made so far has been persisted
    pub async fn flush(&self) -> SdkResult<()> {
        for storage in self.storages() {
            storage.flush_async().await?;
        }
        Ok(())
    }

    /// Upload everything stored by every feature, then stop.
    ///
    /// Data still waiting for consent stays on device.
    #[instrument(skip(self))]
    pub async fn flush_and_tear_down(&self) -> SdkResult<()> {
        self.flush().await?;
        let workers: Vec<_> = self.features.iter().map(|feature| feature.worker.clone()).collect();
        for worker in workers {
            if let Err(e) = worker.flush().await {
                warn!(feature = %worker.feature_name(), error = %e, "Failed to flush feature data");
            }
        }
        self.stop().await;
        Ok(())
    }

    /// Stop every upload worker and unregister all features.
    ///
    /// Handles held by features keep persisting writes; nothing is uploaded
    /// anymore.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let names = self.feature_names();
        for name in names {
            if let Some((_, feature)) = self.features.remove(&name) {
                feature.worker.cancel().await;
            }
        }
        info!("SDK core stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn storages(&self) -> Vec<FeatureStorage> {
        self.features
            .iter()
            .map(|feature| feature.handle.storage().clone())
            .collect()
    }
}

impl std::fmt::Debug for SpoolCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolCore")
            .field("root", &self.root.path())
            .field("features", &self.feature_names())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
