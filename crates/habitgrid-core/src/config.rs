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

use crate::heatmap::{
  HeatmapStyle,
  Labels
};

pub const HABITRC_ENV_VAR: &str =
  "HABITRC";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.habitgrid"),
      ("default.command", "list"),
      ("color", "on"),
      ("heatmap.days", "365"),
      ("heatmap.cell", "14"),
      ("heatmap.title", "on")
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
    habitrc_override
  ))]
  pub fn load(
    habitrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let habitrc = resolve_habitrc_path(
      habitrc_override
    )?;
    if let Some(path) = habitrc {
      info!(habitrc = %path.display(), "loading habitrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no habitrc found; using \
         defaults"
      );
    }

    Ok(cfg)
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

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  pub fn timezone(
    &self
  ) -> Option<String> {
    self
      .get("timezone")
      .filter(|tz| !tz.trim().is_empty())
  }

  /// Length of the trailing window `view` renders when no bounds are given.
  pub fn heatmap_days(
    &self
  ) -> anyhow::Result<u32> {
    let raw = self
      .get("heatmap.days")
      .unwrap_or_else(|| {
        "365".to_string()
      });
    raw.trim().parse::<u32>().with_context(
      || {
        format!(
          "heatmap.days must be a \
           non-negative integer, got \
           '{raw}'"
        )
      }
    )
  }

  pub fn heatmap_style(
    &self
  ) -> anyhow::Result<HeatmapStyle> {
    let raw = self
      .get("heatmap.cell")
      .unwrap_or_else(|| {
        "14".to_string()
      });
    let cell = raw
      .trim()
      .parse::<u32>()
      .ok()
      .filter(|cell| {
        (8..=64).contains(cell)
      })
      .ok_or_else(|| {
        anyhow!(
          "heatmap.cell must be an \
           integer between 8 and 64, \
           got '{raw}'"
        )
      })?;
    Ok(
      HeatmapStyle::default()
        .with_cell(cell)
    )
  }

  pub fn heatmap_title(&self) -> bool {
    self
      .get_bool("heatmap.title")
      .unwrap_or(true)
  }

  /// Axis labels, with `heatmap.weekdays` / `heatmap.months` replacing the
  /// English defaults when set.
  pub fn labels(
    &self
  ) -> anyhow::Result<Labels> {
    let mut labels = Labels::default();

    if let Some(raw) =
      self.get("heatmap.weekdays")
    {
      labels.weekdays =
        parse_label_list(&raw)
          .try_into()
          .map_err(|items: Vec<String>| {
            anyhow!(
              "heatmap.weekdays needs 7 \
               comma-separated labels, \
               got {}",
              items.len()
            )
          })?;
    }

    if let Some(raw) =
      self.get("heatmap.months")
    {
      labels.months =
        parse_label_list(&raw)
          .try_into()
          .map_err(|items: Vec<String>| {
            anyhow!(
              "heatmap.months needs 12 \
               comma-separated labels, \
               got {}",
              items.len()
            )
          })?;
    }

    Ok(labels)
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

    self
      .loaded_files
      .push(path.clone());

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
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
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

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
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
fn resolve_habitrc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(habitrc_env) =
    std::env::var(HABITRC_ENV_VAR)
  {
    if habitrc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      habitrc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping \
       ~/.habitrc"
    );
    return Ok(None);
  };
  let candidate = home.join(".habitrc");
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
  Ok(home.join(".habitgrid"))
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

fn expand_tilde(
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

fn parse_label_list(
  raw: &str
) -> Vec<String> {
  raw
    .split(',')
    .map(|item| item.trim().to_string())
    .filter(|item| !item.is_empty())
    .collect()
}
