use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::video::{DEFAULT_SCALE, MAX_SCALE};

pub const USAGE: &str =
    "Usage: retros <core> <content> [--scale N] [--no-audio] [--headless] [--frames N]";

/// Options for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub core: PathBuf,
    pub content: PathBuf,
    pub scale: u32,
    pub audio: bool,
    pub headless: bool,
    pub max_frames: Option<u64>,
}

impl RuntimeConfig {
    /// Parses the arguments that follow the program name.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let mut positional = Vec::new();
        let mut scale = DEFAULT_SCALE;
        let mut audio = true;
        let mut headless = false;
        let mut max_frames = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--scale" => {
                    scale = flag_value(&mut args, "--scale")?;
                    if !(1..=MAX_SCALE).contains(&scale) {
                        return Err(anyhow!("--scale must be between 1 and {MAX_SCALE}"));
                    }
                }
                "--frames" => max_frames = Some(flag_value(&mut args, "--frames")?),
                "--no-audio" => audio = false,
                "--headless" => headless = true,
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let (Some(core), Some(content), None) =
            (positional.next(), positional.next(), positional.next())
        else {
            return Err(anyhow!(USAGE));
        };

        Ok(Self {
            core: core.into(),
            content: content.into(),
            scale,
            audio: audio && !headless,
            headless,
            max_frames,
        })
    }
}

fn flag_value<T>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = args
        .next()
        .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))?;
    value
        .parse()
        .with_context(|| format!("invalid value for {flag}: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_paths_with_defaults() {
        let config = RuntimeConfig::from_args(["core.so", "game.sfc"]).unwrap();
        assert_eq!(config.core, PathBuf::from("core.so"));
        assert_eq!(config.content, PathBuf::from("game.sfc"));
        assert_eq!(config.scale, 3);
        assert!(config.audio);
        assert!(!config.headless);
        assert_eq!(config.max_frames, None);
    }

    #[test]
    fn flags_may_appear_anywhere() {
        let config =
            RuntimeConfig::from_args(["--scale", "2", "core.so", "--frames", "60", "game.sfc"])
                .unwrap();
        assert_eq!(config.scale, 2);
        assert_eq!(config.max_frames, Some(60));
    }

    #[test]
    fn headless_implies_no_audio() {
        let config = RuntimeConfig::from_args(["core.so", "game.sfc", "--headless"]).unwrap();
        assert!(config.headless);
        assert!(!config.audio);
    }

    #[test]
    fn missing_content_prints_usage() {
        let err = RuntimeConfig::from_args(["core.so"]).unwrap_err();
        assert!(err.to_string().starts_with("Usage:"));
    }

    #[test]
    fn rejects_bad_values_and_unknown_flags() {
        assert!(RuntimeConfig::from_args(["a", "b", "--scale", "0"]).is_err());
        assert!(RuntimeConfig::from_args(["a", "b", "--scale", "big"]).is_err());
        let err = RuntimeConfig::from_args(["a", "b", "--scale", "4294967295"]).unwrap_err();
        assert!(err.to_string().contains("between 1 and 16"));
        assert!(RuntimeConfig::from_args(["a", "b", "--scale", "16"]).is_ok());
        assert!(RuntimeConfig::from_args(["a", "b", "--frames"]).is_err());
        assert!(RuntimeConfig::from_args(["a", "b", "--fullscreen"]).is_err());
        assert!(RuntimeConfig::from_args(["a", "b", "c"]).is_err());
    }
}
