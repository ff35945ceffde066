//
// cli.rs
// dicom-veil
//
// Defines the CLI surface with Clap and drives an anonymization session from the command line.
//

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};

use crate::codec::{encode_payload, Codec};
use crate::config::VeilConfig;
use crate::dicom_codec::DicomCodec;
use crate::dictionary::{dictionary, partition, ActionKind, TagDescriptor, TagKey};
use crate::exporter::{ExportOutcome, PackagingExporter};
use crate::intake::{self, IncomingItem};
use crate::logging;
use crate::profile::{resolve, to_codec_actions, AnonymizationProfile, TokenGenerator};
use crate::session::Session;
use crate::storage::OutputDir;

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-veil")]
#[command(about = "Strip or replace patient-identifying metadata in DICOM files", long_about = None)]
pub struct Cli {
    /// Show debug logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Profile edits shared by every command that resolves actions.
#[derive(clap::Args, Debug, Default)]
pub struct ProfileArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Leave a field untouched (repeatable)
    #[arg(long = "disable", value_name = "KEY")]
    pub disabled: Vec<String>,
    /// Replacement value for a field, KEY=VALUE (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
    /// Pin replacement tokens for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Anonymize DICOM files, zip archives, or directories and export the results
    Anonymize {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// List the identifying fields and their default action
    Dictionary {
        #[arg(short, long, value_enum)]
        action: Option<ActionFilter>,
        /// Restrict to these keys
        keys: Vec<String>,
    },
    /// Print the resolved action payload that would be sent to the codec
    Actions {
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Read identifying field values from a DICOM file
    Inspect {
        file: PathBuf,
        /// Keys to read (all when omitted)
        keys: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ActionFilter {
    Dummy,
    ZeroOrDummy,
    Remove,
}

impl From<ActionFilter> for ActionKind {
    fn from(value: ActionFilter) -> Self {
        match value {
            ActionFilter::Dummy => ActionKind::Dummy,
            ActionFilter::ZeroOrDummy => ActionKind::ZeroOrDummy,
            ActionFilter::Remove => ActionKind::Remove,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    logging::init(if cli.verbose { "debug" } else { "info" });

    match cli.command {
        Commands::Anonymize {
            inputs,
            output,
            profile,
        } => anonymize(&inputs, output, &profile).await?,
        Commands::Dictionary { action, keys } => print_dictionary(action, &keys)?,
        Commands::Actions { profile } => {
            let (_, profile, mut tokens) = load_profile(&profile)?;
            let actions = resolve(&profile, || tokens.next_token());
            println!("{}", encode_payload(&to_codec_actions(&actions))?);
        }
        Commands::Inspect { file, keys } => inspect(&file, &keys).await?,
    }

    Ok(())
}

fn load_profile(
    args: &ProfileArgs,
) -> anyhow::Result<(VeilConfig, AnonymizationProfile, TokenGenerator)> {
    let config = VeilConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let mut profile = config.build_profile()?;

    for name in &args.disabled {
        profile.set_enabled(name.parse::<TagKey>()?, false);
    }
    for pair in &args.overrides {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected KEY=VALUE, got {:?}", pair))?;
        profile.set_override(key.parse::<TagKey>()?, Some(value.to_string()));
    }

    let tokens = match args.seed.or(config.seed) {
        Some(seed) => TokenGenerator::seeded(seed),
        None => TokenGenerator::from_entropy(),
    };
    Ok((config, profile, tokens))
}

/// Anonymizes `inputs` and writes the results to `output` (or the configured directory).
///
/// Files completed before a batch abort are still exported; the abort is returned afterwards.
pub async fn anonymize(
    inputs: &[PathBuf],
    output: Option<PathBuf>,
    args: &ProfileArgs,
) -> anyhow::Result<()> {
    let (config, profile, tokens) = load_profile(args)?;
    let items = intake::collect_inputs(inputs).context("Failed to read inputs")?;

    let codec = Codec::launch(DicomCodec::new());
    let mut session = Session::new(codec, PackagingExporter::new(config.archive_prefix.clone()))
        .with_profile(profile)
        .with_tokens(tokens);

    let submission = session.submit(items);
    for rejected in &submission.rejected {
        eprintln!("Skipped: {}", rejected);
    }
    if submission.accepted.is_empty() {
        bail!("No acceptable DICOM input found");
    }
    println!("Accepted {} file(s).", submission.accepted.len());

    let batch = session.anonymize(&submission.accepted).await;
    match &batch {
        Ok(report) => println!("Anonymized {} file(s).", report.anonymized.len()),
        Err(err) => eprintln!("Anonymization aborted: {}", err),
    }

    let mut out = OutputDir::new(output.unwrap_or(config.output_dir))
        .context("Failed to create output directory")?;
    match session.export_ready(&mut out).await? {
        ExportOutcome::Nothing => println!("Nothing to export."),
        ExportOutcome::Single { name, .. } => println!("Exported {}", name),
        ExportOutcome::Archive { name, entries } => {
            println!("Exported {} file(s) into {}", entries.len(), name)
        }
    }
    for path in out.written() {
        println!("  -> {}", path.display());
    }

    batch.context("Anonymization aborted")?;
    Ok(())
}

fn print_dictionary(action: Option<ActionFilter>, keys: &[String]) -> anyhow::Result<()> {
    let keys = keys
        .iter()
        .map(|k| k.parse::<TagKey>())
        .collect::<Result<Vec<_>, _>>()?;
    let descriptors = dictionary(Some(&keys));
    let sets = partition(&descriptors);

    let groups: [(&str, ActionKind, &[&TagDescriptor]); 3] = [
        ("Replaced by dummy data", ActionKind::Dummy, sets.dummy.as_slice()),
        ("Replaced by zero or dummy data", ActionKind::ZeroOrDummy, sets.zero_or_dummy.as_slice()),
        ("Removed", ActionKind::Remove, sets.remove.as_slice()),
    ];
    let wanted = action.map(ActionKind::from);

    for (title, kind, entries) in groups {
        if wanted.map_or(false, |w| w != kind) || entries.is_empty() {
            continue;
        }
        println!("{} ({})", title, kind);
        for descriptor in entries {
            println!(
                "  {} {:<36} {}",
                descriptor.address(),
                descriptor.key,
                descriptor.display_name
            );
        }
    }
    Ok(())
}

async fn inspect(file: &Path, keys: &[String]) -> anyhow::Result<()> {
    let keys = if keys.is_empty() {
        TagKey::ALL.to_vec()
    } else {
        keys.iter()
            .map(|k| k.parse::<TagKey>())
            .collect::<Result<Vec<_>, _>>()?
    };
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.dcm")
        .to_string();

    let codec = Codec::launch(DicomCodec::new());
    let mut session = Session::new(codec, PackagingExporter::default());
    let submission = session.submit([IncomingItem::new(name, None, bytes)]);
    let Some(id) = submission.accepted.first().copied() else {
        bail!("{:?} is not a .dcm file", file);
    };

    for value in session.query(id, &keys).await? {
        println!(
            "{:<36} {}",
            value.key,
            value.value.as_deref().unwrap_or("N/A")
        );
    }
    Ok(())
}
