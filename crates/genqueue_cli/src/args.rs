use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use genqueue_core::{AspectRatio, Resolution, VideoModel, MAX_OUTPUTS};

pub const USAGE: &str = "\
usage: genqueue [options] [PROMPT ...]

Queues one job per PROMPT, runs the queue until it is idle and saves the
workspace.

options:
  --config <path>       config file (default: genqueue.ron)
  --workspace <id>      workspace to load and save
  --outputs <n>         outputs per prompt, 1-4 (default: 1)
  --model <name>        fast | quality | full model id
  --aspect <ratio>      16:9 | 9:16
  --resolution <res>    720p | 1080p
  --image <path>        source image for every prompt (png, jpeg, webp)
  --retry-failed        re-queue every FAILED job of the workspace
  --export              write finished videos to the export directory
  --verbose             also log to the terminal
  --help                print this text
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub workspace: Option<String>,
    pub outputs: usize,
    pub model: VideoModel,
    pub aspect: AspectRatio,
    pub resolution: Resolution,
    pub image: Option<PathBuf>,
    pub retry_failed: bool,
    pub export: bool,
    pub verbose: bool,
    pub help: bool,
    pub prompts: Vec<String>,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            workspace: None,
            outputs: 1,
            model: VideoModel::default(),
            aspect: AspectRatio::default(),
            resolution: Resolution::default(),
            image: None,
            retry_failed: false,
            export: false,
            verbose: false,
            help: false,
            prompts: Vec::new(),
        }
    }
}

impl CliArgs {
    /// True when there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty() && !self.retry_failed && !self.export
    }
}

pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(next_value(&mut args, "--config")?)),
            "--workspace" => parsed.workspace = Some(next_value(&mut args, "--workspace")?),
            "--outputs" => {
                let raw = next_value(&mut args, "--outputs")?;
                let outputs: usize = raw
                    .parse()
                    .with_context(|| format!("--outputs expects a number, got {raw:?}"))?;
                if !(1..=MAX_OUTPUTS).contains(&outputs) {
                    bail!("--outputs must be between 1 and {MAX_OUTPUTS}");
                }
                parsed.outputs = outputs;
            }
            "--model" => {
                let raw = next_value(&mut args, "--model")?;
                parsed.model =
                    VideoModel::parse(&raw).ok_or_else(|| anyhow!("unknown model {raw:?}"))?;
            }
            "--aspect" => {
                let raw = next_value(&mut args, "--aspect")?;
                parsed.aspect = AspectRatio::parse(&raw)
                    .ok_or_else(|| anyhow!("unknown aspect ratio {raw:?}"))?;
            }
            "--resolution" => {
                let raw = next_value(&mut args, "--resolution")?;
                parsed.resolution = Resolution::parse(&raw)
                    .ok_or_else(|| anyhow!("unknown resolution {raw:?}"))?;
            }
            "--image" => parsed.image = Some(PathBuf::from(next_value(&mut args, "--image")?)),
            "--retry-failed" => parsed.retry_failed = true,
            "--export" => parsed.export = true,
            "--verbose" | "-v" => parsed.verbose = true,
            "--help" | "-h" => parsed.help = true,
            "--" => {
                parsed.prompts.extend(args.by_ref());
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n\n{USAGE}"),
            _ => parsed.prompts.push(arg),
        }
    }
    Ok(parsed)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next().ok_or_else(|| anyhow!("{flag} needs a value"))
}
