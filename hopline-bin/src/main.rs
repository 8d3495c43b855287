#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod constants;
mod error;
mod log;

use crate::{
  config::{build_settings, parse_opts, ConfigToml},
  log::*,
};
use hopline_lib::entrypoint;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() {
  init_logger();

  let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name("hopline");
  let runtime = match runtime_builder.build() {
    Ok(runtime) => runtime,
    Err(e) => {
      error!("Failed to build async runtime: {e}");
      std::process::exit(1);
    }
  };

  runtime.block_on(async {
    let Ok(parsed_opts) = parse_opts() else {
      error!("Invalid command line options");
      std::process::exit(1);
    };

    if let Err(e) = hopline_service(&parsed_opts.config_file_path, runtime.handle().clone()).await {
      error!("hopline service exited: {e}");
      std::process::exit(1);
    }
  });
}

async fn hopline_service(config_file_path: &str, runtime_handle: tokio::runtime::Handle) -> Result<(), anyhow::Error> {
  info!("Start hopline service");
  let config_toml = match ConfigToml::new(config_file_path) {
    Ok(v) => v,
    Err(e) => {
      error!("Invalid toml file: {e}");
      return Err(e);
    }
  };
  let (proxy_conf, route_table) = match build_settings(&config_toml) {
    Ok(v) => v,
    Err(e) => {
      error!("Invalid configuration: {e}");
      return Err(e);
    }
  };

  // stop listeners on ctrl-c
  let cancel_token = CancellationToken::new();
  runtime_handle.spawn({
    let cancel_token = cancel_token.clone();
    async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received ctrl-c, shutting down");
      }
      cancel_token.cancel();
    }
  });

  entrypoint(&proxy_conf, Arc::new(route_table), &runtime_handle, Some(cancel_token))
    .await
    .map_err(|e| anyhow::anyhow!(e))
}
