//! # ghosthire CLI
//!
//! Key setup, one-shot applications from JSON files, and a demo of the full
//! apply/verify flow.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ghosthire_proof::backend::{LocalProver, PROVING_KEY_FILE, VERIFYING_KEY_FILE};
use ghosthire_proof::config::{BackendKind, Config};
use ghosthire_proof::ledger::ApplicationLedger;
use ghosthire_proof::model::{normalize_skill, ApplicantProfile};
use ghosthire_proof::privacy::DataPoint;
use ghosthire_proof::progress::{self, ProgressReporter};
use ghosthire_proof::prover::{load_verifying_key, save_verifying_key};
use ghosthire_proof::store::{JobBoard, MemoryApplicationStore};
use ghosthire_proof::{
    ApplicantClient, ApplicantSecret, ApplicationSubmission, ClientError, EligibilityProver,
    JobDraft, Ledger, ProofGenerator, ProofVerifier, Verifier, WalletContext,
};

#[derive(Parser, Debug)]
#[command(name = "ghosthire", version, about = "Zero-knowledge job eligibility proofs")]
struct Cli {
    /// Repeat for more output (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file. Defaults plus GHOSTHIRE_* variables if absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate Groth16 proving and verifying keys.
    Setup {
        #[arg(long, default_value = "./keys")]
        key_dir: PathBuf,

        /// Deterministic setup. Development only.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Publish a job from JSON, prove a profile against it, and submit.
    Apply {
        /// JobDraft JSON.
        #[arg(long)]
        job: PathBuf,

        /// Applicant profile JSON.
        #[arg(long)]
        profile: PathBuf,

        #[arg(long, default_value = "posting-1")]
        posting: String,

        /// Data points to disclose, e.g. `salary`, `region`, `skill:rust`.
        #[arg(long, value_delimiter = ',')]
        disclose: Vec<String>,

        #[arg(long, default_value = "local-wallet")]
        wallet: String,
    },

    /// Walk through an accepted, a duplicate and an ineligible application.
    Demo {
        /// Use the simulated backend instead of an in-process Groth16 setup.
        #[arg(long)]
        simulated: bool,
    },
}

/// Applicant profile as stored on disk.
#[derive(Debug, Deserialize)]
struct ProfileFile {
    skills: BTreeMap<String, u8>,
    region: String,
    expected_salary: u64,
    /// Reusing a secret across runs is what makes duplicate detection work.
    secret: Option<ApplicantSecret>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Setup { key_dir, seed } => setup(&key_dir, seed),
        Commands::Apply {
            job,
            profile,
            posting,
            disclose,
            wallet,
        } => apply(&config, &job, &profile, &posting, &disclose, &wallet).await,
        Commands::Demo { simulated } => demo(simulated).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    info!(environment = %config.environment, backend = ?config.prover.backend, "configuration loaded");
    Ok(config)
}

fn setup(key_dir: &Path, seed: Option<u64>) -> Result<()> {
    std::fs::create_dir_all(key_dir)
        .with_context(|| format!("creating {}", key_dir.display()))?;

    let (prover, vk) = match seed {
        Some(seed) => {
            warn!("deterministic setup: keys are NOT secure");
            EligibilityProver::setup_with_seed(seed)?
        }
        None => EligibilityProver::setup()?,
    };
    prover.save_proving_key(&key_dir.join(PROVING_KEY_FILE))?;
    save_verifying_key(&vk, &key_dir.join(VERIFYING_KEY_FILE))?;

    info!(key_dir = %key_dir.display(), vk = %prover.verification_key_ref(), "keys written");
    println!("{}", prover.verification_key_ref());
    Ok(())
}

fn parse_disclosures(raw: &[String]) -> Result<BTreeSet<DataPoint>> {
    raw.iter()
        .map(|item| match item.trim() {
            "salary" => Ok(DataPoint::Salary),
            "region" => Ok(DataPoint::Region),
            other => match other.strip_prefix("skill:") {
                Some(skill) if !skill.is_empty() => {
                    Ok(DataPoint::Skill(normalize_skill(skill)))
                }
                _ => bail!("unknown data point {other:?}"),
            },
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Log progress updates until the session ends.
fn watch_progress() -> ProgressReporter {
    let (reporter, mut watcher) = progress::channel();
    tokio::spawn(async move {
        while let Some(percent) = watcher.changed().await {
            info!(percent, "proof generation");
        }
    });
    reporter
}

async fn apply(
    config: &Config,
    job_path: &Path,
    profile_path: &Path,
    posting: &str,
    disclose: &[String],
    wallet_address: &str,
) -> Result<()> {
    let draft: JobDraft = read_json(job_path)?;
    let file: ProfileFile = read_json(profile_path)?;
    let secret = file.secret.unwrap_or_else(|| {
        warn!("profile has no secret; generated a fresh one, duplicates cannot be detected across runs");
        ApplicantSecret::generate()
    });
    let profile = ApplicantProfile::new(file.skills, file.region, file.expected_salary, secret)?;
    let disclosed = parse_disclosures(disclose)?;

    let board = Arc::new(JobBoard::new());
    let job = board.publish(posting, "cli-employer", draft)?;

    let vk_path = config.prover.key_dir.join(VERIFYING_KEY_FILE);
    let vk = if vk_path.exists() {
        Some(load_verifying_key(&vk_path)?)
    } else {
        None
    };
    let verifier = ProofVerifier::from_parts(vk, config.accepts_simulated())
        .context("building the verifier; run `ghosthire setup` first")?;
    let ledger = Arc::new(
        Ledger::new(
            Arc::clone(&board),
            Arc::new(MemoryApplicationStore::new()),
            verifier,
        )
        .with_verify_deadline(config.ledger.verify_deadline()),
    );

    let generator = ProofGenerator::from_config(config)?;
    let client = ApplicantClient::new(board, generator, ledger);

    let mut wallet = WalletContext::new(config.environment.to_string());
    wallet.connect(wallet_address)?;

    let receipt = client
        .apply(&wallet, job.id(), &profile, disclosed, &watch_progress())
        .await?;
    wallet.disconnect();

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn demo(simulated: bool) -> Result<()> {
    let board = Arc::new(JobBoard::new());
    let draft = JobDraft {
        title: "Protocol Engineer".into(),
        company: "Acme".into(),
        skill_thresholds: [("rust".to_string(), 70), ("zk".to_string(), 50)].into(),
        salary_min: 90_000,
        salary_max: 150_000,
        allowed_regions: ["US-CA".to_string(), "CA-ON".to_string()].into(),
    };
    let job = board.publish("acme-protocol", "acme-hr", draft)?;
    info!(job = %job.id(), "published demo job");

    let mut config = Config::default();
    let (verifier, generator) = if simulated {
        config.prover.backend = BackendKind::Simulated;
        config.prover.simulated_latency_ms = 300;
        (
            ProofVerifier::simulated_only(),
            ProofGenerator::from_config(&config)?,
        )
    } else {
        info!("running trusted setup for the demo (development seed)");
        let (prover, vk) = EligibilityProver::setup_with_seed(42)?;
        let backend = ghosthire_proof::Backend::Local(LocalProver::new(Arc::new(prover)));
        (
            ProofVerifier::groth16(Verifier::new(vk)?),
            ProofGenerator::new(backend, config.prover.deadline()),
        )
    };

    let ledger = Arc::new(Ledger::new(
        Arc::clone(&board),
        Arc::new(MemoryApplicationStore::new()),
        verifier,
    ));
    let client = ApplicantClient::new(Arc::clone(&board), generator, Arc::clone(&ledger));

    let mut wallet = WalletContext::new("demo");
    wallet.connect("demo-wallet")?;

    let secret = ApplicantSecret::generate();
    let skills: BTreeMap<String, u8> = [("rust".to_string(), 80), ("zk".to_string(), 60)].into();
    let applicant = ApplicantProfile::new(skills.clone(), "CA-ON", 120_000, secret.clone())?;

    let receipt = client
        .apply(&wallet, job.id(), &applicant, BTreeSet::new(), &watch_progress())
        .await?;
    println!(
        "accepted: application {} (privacy score {})",
        receipt.application.id, receipt.application.privacy_score
    );

    match client
        .apply(&wallet, job.id(), &applicant, BTreeSet::new(), &ProgressReporter::detached())
        .await
    {
        Err(ClientError::Rejected(rejection)) => println!("second attempt: {}", rejection.reason),
        other => bail!("expected the duplicate to be rejected, got {other:?}"),
    }

    let elsewhere = ApplicantProfile::new(skills, "DE-BE", 120_000, secret)?;
    match client
        .apply(&wallet, job.id(), &elsewhere, BTreeSet::new(), &ProgressReporter::detached())
        .await
    {
        Err(ClientError::Prover(e)) => println!("applicant in DE-BE: {e}"),
        other => bail!("expected a local eligibility failure, got {other:?}"),
    }

    // A direct ledger submission of an already accepted proof.
    let proof = client
        .prove(job.id(), &applicant, &ProgressReporter::detached())
        .await?;
    if let Err(rejection) = ledger
        .submit_application(ApplicationSubmission::new(proof))
        .await
    {
        println!("resubmitted proof: {}", rejection.reason);
    }

    let stats = ledger.privacy_stats();
    println!(
        "ledger: {} application(s), {} submission(s), average privacy score {:.1}",
        stats.applications,
        ledger.submissions().len(),
        stats.average_score()
    );
    Ok(())
}
