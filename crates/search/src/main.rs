//! TaxLex Search CLI
//!
//! Answers statute questions from the persisted index. Questions come from the
//! command line, or one per line on stdin when no arguments are given. Each
//! answer is printed as JSON: the retrieval context, extracted citations,
//! cross-references between revenue areas and any tax estimates.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use taxlex_common::embeddings::create_embedder;
use taxlex_common::metrics::{histogram_buckets, register_metrics};
use taxlex_common::telemetry::init_tracing;
use taxlex_common::{AppConfig, VERSION};
use taxlex_search::classifier::{QueryComplexity, QueryEntities};
use taxlex_search::{
    Citation, CitationExtractor, CrossReference, HybridRetriever, IndexPersistence, IndexStore,
    QueryClassifier, RelationshipGraph, RetrievalContext, ScenarioContext, TaxCalculation,
    TaxCalculator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Serialize)]
struct SearchOutput<'a> {
    context: &'a RetrievalContext,
    complexity: QueryComplexity,
    entities: QueryEntities,
    citations: Vec<Citation>,
    cross_references: CrossReference,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    calculations: Vec<TaxCalculation>,
}

/// Everything needed to answer one question
struct Answerer {
    retriever: HybridRetriever,
    extractor: CitationExtractor,
    calculator: TaxCalculator,
    relationships: RelationshipGraph,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate_all()?;
    init_tracing(&config.observability)?;

    info!("Starting TaxLex search v{}", VERSION);

    if let Some(port) = config.observability.metrics_port {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let mut builder = PrometheusBuilder::new().with_http_listener(addr);
        for (name, buckets) in histogram_buckets() {
            builder = builder
                .set_buckets_for_metric(Matcher::Full(name.clone()), buckets)
                .with_context(|| format!("invalid buckets for {}", name))?;
        }
        builder
            .install()
            .context("failed to install Prometheus exporter")?;
        register_metrics();
        info!(port = port, "Metrics exporter listening");
    }

    let embedder = create_embedder(&config.embedding)?;

    let persistence = IndexPersistence::new(&config.index.artifact_dir);
    let generation = persistence.load_current().map_err(|e| {
        error!(error = %e, dir = %config.index.artifact_dir.display(), "No usable index; run the indexer first");
        e
    })?;
    info!(statistics = ?generation.statistics(), "Index loaded");

    let store = Arc::new(IndexStore::new());
    store.publish(generation).await;

    let classifier = QueryClassifier::new(config.classifier.clone())?;
    let retriever = HybridRetriever::new(store, embedder, classifier, config.retrieval.clone());
    let answerer = Answerer {
        retriever,
        extractor: CitationExtractor::new()?,
        calculator: TaxCalculator::new(config.calculation.clone())?,
        relationships: RelationshipGraph::from_config(&config.calculation),
    };

    let queries: Vec<String> = std::env::args().skip(1).collect();
    if queries.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                answerer.answer(&line).await;
            }
        }
    } else {
        for query in &queries {
            answerer.answer(query).await;
        }
    }

    Ok(())
}

impl Answerer {
    async fn answer(&self, query: &str) {
        let context = match self.retriever.retrieve(query).await {
            Ok(context) => context,
            Err(e) => {
                error!(
                    code = e.code().as_code(),
                    stage = ?e.stage(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Query failed"
                );
                return;
            }
        };

        let classifier = self.retriever.classifier();
        let entities = classifier.extract_entities(query, context.category);
        let scenario = ScenarioContext::from_query(query, context.category, &entities);
        let citations = self.extractor.extract_from_context(&context);
        let cross_references =
            self.relationships
                .analyze_citations(context.category, &citations, scenario.as_ref());
        let calculations = match self.calculator.for_query(query, context.category, &entities) {
            Ok(calculations) => calculations,
            Err(e) => {
                warn!(error = %e, "Tax estimate skipped");
                Vec::new()
            }
        };

        let output = SearchOutput {
            complexity: classifier.complexity(query),
            entities,
            citations,
            cross_references,
            calculations,
            context: &context,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "Failed to serialize result"),
        }
    }
}
