use std::{env, sync::Once};

use ragkb::{config, embedding, pipeline::RagService};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("CHROMA_URL", "http://127.0.0.1:8000");
        set_default_env("CHROMA_COLLECTION", "ragkb-live");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "all-minilm");
        set_default_env("EMBEDDING_DIMENSION", "384");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
    });
    config::init_config().expect("configuration (GOOGLE_API_KEY must be set)")
}

#[tokio::test]
#[ignore = "Requires live Chroma"]
async fn live_chroma_status() {
    let config = init_config_once();
    let service = RagService::from_config(config).expect("service");
    let report = service.status().await.expect("Chroma should be reachable");
    assert_eq!(report.metrics.queries_answered, 0);
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    let config = init_config_once();
    let client = embedding::build_embedding_client(config);
    let vectors = client
        .generate_embeddings(vec!["ragkb live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}

#[tokio::test]
#[ignore = "Requires live Chroma, Ollama, and Gemini"]
async fn live_query_roundtrip() {
    let config = init_config_once();
    let service = RagService::from_config(config).expect("service");
    let outcome = service
        .query("What is this knowledge base about?", Some(2))
        .await
        .expect("query");
    assert!(!outcome.llm_answer.is_empty());
}
