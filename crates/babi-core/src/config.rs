use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::parse_ymd;
use crate::model::PartnerNames;
use crate::space::{
  DEFAULT_START_DATE,
  SpaceOptions
};
use crate::upload::UploadSettings;

/// Environment variables that fill
/// upload keys the babirc leaves unset.
const ENV_FALLBACKS: [(&str, &str); 2] = [
  ("upload.url", "BABI_UPLOAD_URL"),
  ("upload.token", "BABI_UPLOAD_TOKEN")
];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.babi"),
      ("color", "on"),
      ("start.default", DEFAULT_START_DATE),
      ("partner.male.name", "Ronron"),
      ("partner.female.name", "Bribri")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    babirc_override
  ))]
  pub fn load(
    babirc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let babirc = resolve_babirc_path(
      babirc_override
    )?;
    if let Some(path) = babirc {
      info!(babirc = %path.display(), "loading babirc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no babirc found; using \
         defaults"
      );
    }

    cfg.fill_from_env(|name| {
      std::env::var(name).ok()
    });
    Ok(cfg)
  }

  /// Sets upload keys from the
  /// environment when still unset.
  pub fn fill_from_env(
    &mut self,
    lookup: impl Fn(&str) -> Option<String>
  ) {
    for (key, var) in ENV_FALLBACKS {
      if self.map.contains_key(key) {
        continue;
      }
      if let Some(value) = lookup(var)
        .filter(|v| !v.trim().is_empty())
      {
        debug!(key, var, "filled key from environment");
        self.map.insert(
          key.to_string(),
          value.trim().to_string()
        );
      }
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn partner_names(
    &self
  ) -> PartnerNames {
    let defaults =
      PartnerNames::default();
    let pick = |key: &str,
                fallback: String| {
      self
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
    };
    PartnerNames {
      male:   pick(
        "partner.male.name",
        defaults.male
      ),
      female: pick(
        "partner.female.name",
        defaults.female
      )
    }
  }

  pub fn space_options(
    &self
  ) -> anyhow::Result<SpaceOptions> {
    let raw = self
      .get("start.default")
      .unwrap_or_else(|| {
        DEFAULT_START_DATE.to_string()
      });
    let default_start =
      parse_ymd(&raw).with_context(
        || {
          format!(
            "invalid start.default: \
             {raw}"
          )
        }
      )?;
    Ok(SpaceOptions {
      partners: self.partner_names(),
      default_start
    })
  }

  pub fn upload_settings(
    &self
  ) -> UploadSettings {
    let non_empty = |key: &str| {
      self
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    };
    UploadSettings {
      url:   non_empty("upload.url"),
      token: non_empty("upload.token")
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self.loaded_files.push(
      fs::canonicalize(&path)
        .unwrap_or_else(|_| path.clone())
    );

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once(" #")
      {
        line = before.trim();
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if !include_path.exists() {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        } else if self
          .already_loaded(&include_path)
        {
          warn!(include = %include_path.display(), "include already loaded; skipping");
        } else {
          self
            .load_file(&include_path)?;
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

impl Config {
  /// Each file loads at most once, which
  /// also breaks include cycles.
  fn already_loaded(
    &self,
    path: &Path
  ) -> bool {
    let canonical = fs::canonicalize(path)
      .unwrap_or_else(|_| {
        path.to_path_buf()
      });
    self.loaded_files.contains(&canonical)
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_babirc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(babirc_env) =
    std::env::var("BABIRC")
  {
    if babirc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      babirc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping babirc"
    );
    return Ok(None);
  };
  let candidate = home.join(".babirc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".babi"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

pub fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[test]
  fn defaults_cover_every_key() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get("data.location").as_deref(),
      Some("~/.babi")
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
    let options = cfg
      .space_options()
      .expect("options");
    assert_eq!(
      options.default_start.to_string(),
      DEFAULT_START_DATE
    );
    assert_eq!(
      options.partners,
      PartnerNames::default()
    );
    assert_eq!(
      cfg.upload_settings(),
      UploadSettings::default()
    );
  }

  #[test]
  fn babirc_with_include_and_comments()
  {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    fs::write(
      temp.path().join("extra.rc"),
      "upload.url = http://localhost:8787/upload\n"
    )
    .expect("write include");
    let rc = temp.path().join(".babirc");
    fs::write(
      &rc,
      "# partners\npartner.male.name = Ron   # nickname\ncolor = off\ninclude extra.rc\ninclude missing.rc\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&rc))
      .expect("load");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.partner_names().male,
      "Ron"
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
    assert_eq!(
      cfg
        .upload_settings()
        .url
        .as_deref(),
      Some("http://localhost:8787/upload")
    );
  }

  #[test]
  fn include_cycle_loads_each_file_once()
  {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let a = temp.path().join("a.rc");
    fs::write(
      &a,
      "include b.rc\ncolor = off\n"
    )
    .expect("write a");
    fs::write(
      temp.path().join("b.rc"),
      "include ./a.rc\npartner.female.name = Bri\n"
    )
    .expect("write b");

    let cfg = Config::load(Some(&a))
      .expect("load");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.partner_names().female,
      "Bri"
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );

    let own = temp.path().join("own.rc");
    fs::write(
      &own,
      "include own.rc\ncolor = off\n"
    )
    .expect("write own");
    let cfg = Config::load(Some(&own))
      .expect("load self include");
    assert_eq!(cfg.loaded_files.len(), 1);
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let rc = temp.path().join(".babirc");
    fs::write(&rc, "just words\n")
      .expect("write rc");
    let err = Config::load(Some(&rc))
      .expect_err("bad line");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }

  #[test]
  fn overrides_and_env_fallbacks() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "rc.upload.token".to_string(),
      "from-rc".to_string()
    )]);
    cfg.fill_from_env(|name| {
      match name {
        | "BABI_UPLOAD_URL" => Some(
          "https://up.example/upload"
            .to_string()
        ),
        | "BABI_UPLOAD_TOKEN" => {
          Some("from-env".to_string())
        }
        | _ => None
      }
    });

    let settings =
      cfg.upload_settings();
    assert_eq!(
      settings.url.as_deref(),
      Some("https://up.example/upload")
    );
    assert_eq!(
      settings.token.as_deref(),
      Some("from-rc")
    );
  }

  #[test]
  fn bad_default_start_is_reported() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "start.default".to_string(),
      "tomorrow".to_string()
    )]);
    assert!(cfg.space_options().is_err());
  }
}
