use super::toml::ConfigToml;
use crate::error::{anyhow, ensure};
use clap::Arg;
use hopline_lib::{ProxyConfig, RouteTable};

/// Parsed options
pub struct Opts {
  pub config_file_path: String,
}

/// Parse arg values passed from cli
pub fn parse_opts() -> Result<Opts, anyhow::Error> {
  let _ = include_str!("../../Cargo.toml");
  let options = clap::command!().arg(
    Arg::new("config_file")
      .long("config")
      .short('c')
      .value_name("FILE")
      .required(true)
      .help("Configuration file path like ./config.toml"),
  );
  let matches = options.get_matches();

  ///////////////////////////////////
  let config_file_path = matches
    .get_one::<String>("config_file")
    .ok_or(anyhow!("Missing config file path"))?
    .to_owned();

  Ok(Opts { config_file_path })
}

pub fn build_settings(config: &ConfigToml) -> std::result::Result<(ProxyConfig, RouteTable), anyhow::Error> {
  // build proxy config
  let proxy_config: ProxyConfig = config.try_into()?;

  // routes
  let routes = config.route.as_ref().ok_or(anyhow!("Missing route spec"))?;
  ensure!(!routes.is_empty(), "At least one route must be specified");
  let routes = routes
    .iter()
    .map(|route| route.build_route())
    .collect::<Result<Vec<_>, _>>()?;

  Ok((proxy_config, RouteTable::new(routes)))
}
