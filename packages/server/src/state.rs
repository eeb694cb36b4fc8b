//! Shared application state wiring.

use std::sync::Arc;

use async_trait::async_trait;
use llm_client::{LlmClient, ModelMap};
use research::error::SearchError;
use research::ingest::Ingestor;
use research::llm::{Gateway, Llm};
use research::rank::rerank::HttpReranker;
use research::rank::Ranker;
use research::reader::{HttpReader, PrimaryReaderConfig, Reader};
use research::search::tavily::TavilySearcher;
use research::search::{ProviderHit, SearchAdapter, SearchOptions, SearchProvider};
use research::secret::SecretKey;
use research::{Orchestrator, Store};

use crate::config::Config;

/// State shared by every route handler.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub llm: Arc<dyn Llm>,
    pub search: SearchAdapter,
    pub ingestor: Ingestor,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the pipeline from configuration.
    pub async fn build(config: Config) -> anyhow::Result<Arc<Self>> {
        let store = Store::connect(&config.database_url).await?;

        let mut client = LlmClient::new(config.llm_api_key.clone());
        if let Some(base) = &config.llm_base_url {
            client = client.with_base_url(base.clone());
        }
        let llm: Arc<dyn Llm> = Arc::new(Gateway::new(client, ModelMap::from_env()));

        let primary: Arc<dyn SearchProvider> = match &config.search_api_key {
            Some(key) => Arc::new(TavilySearcher::new(key.clone())),
            None => {
                tracing::warn!("no search provider key; searches will return nothing");
                Arc::new(DisabledSearcher)
            }
        };
        let search = SearchAdapter::new(primary);

        let mut reader = HttpReader::new().with_raw_domains(config.reader_raw_domains.clone());
        if let Some(base_url) = &config.reader_base_url {
            reader = reader.with_primary(PrimaryReaderConfig {
                base_url: base_url.clone(),
                api_key: config.reader_api_key.clone().map(SecretKey::new),
            });
        }
        let reader: Arc<dyn Reader> = Arc::new(reader);
        let ingestor = Ingestor::new(store.clone(), reader);

        let mut ranker = Ranker::new(store.clone());
        if config.pipeline.enable_rerank {
            if let Some(base_url) = &config.rerank_base_url {
                let mut reranker = HttpReranker::new(base_url, config.rerank_model.clone())?;
                if let Some(key) = &config.rerank_api_key {
                    reranker = reranker.with_api_key(SecretKey::new(key.clone()));
                }
                ranker = ranker.with_reranker(Arc::new(reranker));
            }
        }

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            llm.clone(),
            search.clone(),
            ingestor.clone(),
            ranker,
            config.pipeline.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            store,
            llm,
            search,
            ingestor,
            orchestrator,
        }))
    }
}

/// Stand-in provider when no search key is configured.
struct DisabledSearcher;

#[async_trait]
impl SearchProvider for DisabledSearcher {
    async fn search(
        &self,
        _query: &str,
        _opts: &SearchOptions,
    ) -> Result<Vec<ProviderHit>, SearchError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
