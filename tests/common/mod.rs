use std::sync::Arc;

use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trigger_engine::engine::ExpressionEngine;
use trigger_engine::types::Mode;

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[allow(dead_code)]
pub fn engine(mode: Mode) -> Arc<ExpressionEngine> {
    Arc::new(ExpressionEngine::new(mode))
}
