//! Command line options.

use std::path::PathBuf;

use ember_app::AppConfig;

/// Options parsed from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewerArgs {
    pub help: bool,
    pub assets: Option<PathBuf>,
    pub vsync: bool,
    pub validation: Option<bool>,
    pub frames_in_flight: Option<usize>,
    pub size: Option<(u32, u32)>,
}

impl ViewerArgs {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--vsync" => parsed.vsync = true,
                "--validation" => parsed.validation = Some(true),
                "--no-validation" => parsed.validation = Some(false),
                "-a" | "--assets" => {
                    let dir = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("{arg} needs a directory"))?;
                    parsed.assets = Some(PathBuf::from(dir));
                }
                "--frames-in-flight" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("{arg} needs a number"))?;
                    let frames: usize = value.parse()?;
                    if frames == 0 {
                        anyhow::bail!("{arg} must be at least 1");
                    }
                    parsed.frames_in_flight = Some(frames);
                }
                "--size" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("{arg} needs WIDTHxHEIGHT"))?;
                    parsed.size = Some(parse_size(&value)?);
                }
                other if !other.starts_with('-') && parsed.assets.is_none() => {
                    parsed.assets = Some(PathBuf::from(other));
                }
                other => anyhow::bail!("unknown argument: {other}"),
            }
        }

        Ok(parsed)
    }

    /// Apply the options on top of `config`.
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(assets) = &self.assets {
            config = config.with_assets_root(assets.clone());
        }
        if self.vsync {
            config = config.with_vsync(true);
        }
        if let Some(validation) = self.validation {
            config = config.with_validation(validation);
        }
        if let Some(frames) = self.frames_in_flight {
            config = config.with_frames_in_flight(frames);
        }
        if let Some((width, height)) = self.size {
            config = config.with_size(width, height);
        }
        config
    }
}

fn parse_size(value: &str) -> anyhow::Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("size must look like 800x600, got {value}"))?;
    Ok((width.parse()?, height.parse()?))
}
