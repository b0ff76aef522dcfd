pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod duration;
pub mod entropy;
pub mod invitation;
pub mod milestones;
pub mod model;
pub mod render;
pub mod space;
pub mod upload;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

/// Subdirectory of the data
/// directory holding the login session.
pub const SESSION_SUBDIR: &str =
  "session";

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting babi CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.babirc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let local =
    datastore::FileStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;
  let session =
    datastore::FileStore::open(
      &data_dir.join(SESSION_SUBDIR)
    )?;

  let mut space = space::Space::new(
    local,
    session,
    cfg.space_options()?
  );
  let renderer = render::Renderer::new(
    cfg.get("color").as_deref()
  )?;
  let upload = cfg.upload_settings();

  let stdout = std::io::stdout();
  let mut out = stdout.lock();
  let mut env = commands::CommandEnv {
    renderer: &renderer,
    upload:   &upload,
    now:      Utc::now(),
    out:      &mut out
  };

  commands::dispatch(
    &mut space,
    &mut env,
    cli.command
  )?;

  info!("done");
  Ok(())
}
