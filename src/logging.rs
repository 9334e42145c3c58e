//! Inicialização do logging estruturado via `tracing`.

use tracing_subscriber::EnvFilter;

/// Instala o subscriber global, escrevendo em stderr.
///
/// `RUST_LOG` tem precedência; sem ela o nível é `info`, ou `debug` para o
/// próprio crate quando `verbose` está ativo. Chamadas repetidas são no-ops.
pub fn init(verbose: bool) {
    let fallback = if verbose { "info,assetwatch=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
