use anyhow::{Context, Result};
use log::{debug, info};

use retros::{
    driver, AudioDriver, CpalDriver, DynamicCore, Frontend, HeadlessPlatform, NullDriver,
    RuntimeConfig, RuntimeError, WindowPlatform,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        let status = err
            .downcast_ref::<RuntimeError>()
            .map_or(1, RuntimeError::exit_code);
        std::process::exit(status);
    }
}

fn run() -> Result<()> {
    let config = RuntimeConfig::from_args(std::env::args().skip(1))?;

    let core = DynamicCore::open(&config.core)
        .with_context(|| format!("failed to load core {}", config.core.display()))?;
    debug!(
        "{} optional entry points: [{}]",
        core.path().display(),
        core.optional_symbols().join(", ")
    );

    let audio: Box<dyn AudioDriver> = if config.audio {
        Box::new(CpalDriver)
    } else {
        Box::new(NullDriver)
    };
    let mut frontend = Frontend::new(config.scale, audio);

    let outcome = if config.headless {
        let mut platform = HeadlessPlatform::new();
        driver::run(core, &config.content, &mut frontend, &mut platform, config.max_frames)
    } else {
        let mut platform = WindowPlatform::new().context("failed to open a window")?;
        driver::run(core, &config.content, &mut frontend, &mut platform, config.max_frames)
    };
    let stats =
        outcome.with_context(|| format!("session for {} failed", config.content.display()))?;

    info!("clean exit after {} frames", stats.frames);
    Ok(())
}
