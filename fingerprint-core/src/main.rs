//! Fingerprint Agent - Main Entry Point

mod cli;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use std::path::Path;

use cli::{Cli, Commands, SourceArgs};
use fingerprint_core::constants;
use fingerprint_core::logic::device_code::{
    MerchantCredentials, PageContext, ReportConfig, ReportingClient,
};
use fingerprint_core::logic::identity::{Fingerprint, SimilarityScorer};
use fingerprint_core::logic::signals::{
    BrowserProbe, EnvironmentProbe, GeneratedFingerprint, HeadlessProbe, SignalCollector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::info!("Starting {} v{}", constants::APP_NAME, constants::APP_VERSION);

    match cli.command {
        Commands::Collect { source, signals, status } => {
            collect(select_collector(&source)?, signals, status).await
        }
        Commands::Stability { source } => stability(select_collector(&source)?).await,
        Commands::Report { source, url, referrer } => {
            let page = PageContext { user_agent: None, url, referrer };
            report(select_collector(&source)?, &source, page).await
        }
        Commands::Verify { fingerprint, merchant_key } => verify(&fingerprint, merchant_key).await,
        Commands::Compare { first, second, threshold } => {
            let scorer = match threshold {
                Some(threshold) => SimilarityScorer::with_threshold(threshold),
                None => SimilarityScorer::from_env(),
            };
            compare(&first, &second, &scorer).await
        }
    }
}

// ============================================================================
// PROBE SELECTION
// ============================================================================

/// Collector over whichever probe the command line selected
enum ProbeCollector {
    Browser(SignalCollector<BrowserProbe>),
    Headless(SignalCollector<HeadlessProbe>),
}

macro_rules! dispatch {
    ($collector:expr, $c:ident => $body:expr) => {
        match $collector {
            ProbeCollector::Browser(mut $c) => $body,
            ProbeCollector::Headless(mut $c) => $body,
        }
    };
}

/// Parse a captured browser environment from disk
fn load_snapshot(path: &Path) -> anyhow::Result<BrowserProbe> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    BrowserProbe::from_json(&json).with_context(|| format!("parsing snapshot {}", path.display()))
}

fn select_collector(source: &SourceArgs) -> anyhow::Result<ProbeCollector> {
    let merchant_key = source.merchant_key.clone().or_else(constants::get_merchant_key);

    match &source.snapshot {
        Some(path) => {
            log::info!("Using browser snapshot: {}", path.display());
            let collector = SignalCollector::new(load_snapshot(path)?);
            Ok(ProbeCollector::Browser(salted(collector, merchant_key)))
        }
        None => {
            log::info!("No snapshot given, probing host headless");
            let collector = SignalCollector::new(HeadlessProbe::new());
            Ok(ProbeCollector::Headless(salted(collector, merchant_key)))
        }
    }
}

fn salted<P: EnvironmentProbe>(
    collector: SignalCollector<P>,
    merchant_key: Option<String>,
) -> SignalCollector<P> {
    match merchant_key {
        Some(key) => collector.with_merchant_key(key),
        None => collector,
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

async fn collect(collector: ProbeCollector, print_signals: bool, print_status: bool) -> anyhow::Result<()> {
    dispatch!(collector, c => {
        let generated = c.generate().await;
        print_generated(&generated);

        if print_signals {
            if let Some(signals) = c.signals() {
                println!("{}", serde_json::to_string_pretty(signals)?);
            }
        }
        if print_status {
            println!("{}", serde_json::to_string_pretty(&c.device_status())?);
        }
        Ok(())
    })
}

async fn stability(collector: ProbeCollector) -> anyhow::Result<()> {
    dispatch!(collector, c => {
        let stable = c.validate_stability().await?;
        c.generate().await;
        let key_components = c.quick_stability_check();

        println!("stable across collections: {}", stable);
        println!("key components present:   {}", key_components);
        if !stable {
            bail!("fingerprint changed between two collections");
        }
        Ok(())
    })
}

async fn report(collector: ProbeCollector, source: &SourceArgs, page: PageContext) -> anyhow::Result<()> {
    let credentials = credentials(source)?;
    let client = ReportingClient::new(ReportConfig::default())?.with_page_context(page);

    dispatch!(collector, c => {
        let generated = c.generate().await;
        let Some(stable) = generated.stable() else {
            print_generated(&generated);
            bail!("low-confidence fingerprint cannot be reported");
        };

        let outcome = client.report(&credentials, stable, &c.device_status()).await?;
        println!("fingerprint: {}", outcome.fingerprint);
        println!("device code: {}", outcome.device_code);
        println!("new device:  {}", outcome.is_new);
        println!("updated at:  {}", outcome.updated_at);
        Ok(())
    })
}

async fn verify(fingerprint: &str, merchant_key: Option<String>) -> anyhow::Result<()> {
    let fingerprint = Fingerprint::parse(fingerprint)
        .ok_or_else(|| anyhow!("fingerprint must be 32 lowercase hex chars"))?;
    let merchant_key = merchant_key
        .or_else(constants::get_merchant_key)
        .ok_or_else(|| anyhow!("merchant key required (--merchant-key or FINGERPRINT_MERCHANT_KEY)"))?;

    let client = ReportingClient::new(ReportConfig::default())?;
    let outcome = client.verify(&merchant_key, &fingerprint).await?;

    println!("valid:       {}", outcome.valid);
    println!("device code: {}", outcome.device_code);
    println!("created at:  {}", outcome.created_at);
    Ok(())
}

/// Similarity score of two snapshots, as collected signal sets
async fn similarity(first: &Path, second: &Path, scorer: &SimilarityScorer) -> anyhow::Result<f64> {
    let a = SignalCollector::new(load_snapshot(first)?).collect().await?;
    let b = SignalCollector::new(load_snapshot(second)?).collect().await?;
    Ok(scorer.score(&a, &b))
}

async fn compare(first: &Path, second: &Path, scorer: &SimilarityScorer) -> anyhow::Result<()> {
    let score = similarity(first, second, scorer).await?;
    log::debug!("Similarity threshold {}", scorer.threshold());

    println!("similarity:  {:.2}%", score * 100.0);
    println!("threshold:   {:.2}%", scorer.threshold() * 100.0);
    println!("same device: {}", score >= scorer.threshold());
    Ok(())
}

fn credentials(source: &SourceArgs) -> anyhow::Result<MerchantCredentials> {
    let env = MerchantCredentials::from_env();
    let merchant_key = source
        .merchant_key
        .clone()
        .or_else(|| env.as_ref().map(|c| c.merchant_key.clone()))
        .ok_or_else(|| anyhow!("merchant key required (--merchant-key or FINGERPRINT_MERCHANT_KEY)"))?;

    let mut credentials = MerchantCredentials::new(merchant_key);
    if let Some(secret) = source
        .secret_key
        .clone()
        .or_else(|| env.and_then(|c| c.secret_key))
    {
        credentials = credentials.with_secret(secret);
    }
    Ok(credentials)
}

fn print_generated(generated: &GeneratedFingerprint) {
    match generated {
        GeneratedFingerprint::Stable(stable) => {
            println!("fingerprint: {}", stable.fingerprint);
            println!("signals:     {}", stable.signals.len());
        }
        GeneratedFingerprint::LowConfidence { fingerprint, reason } => {
            println!("fingerprint: {} (low confidence)", fingerprint);
            println!("reason:      {}", reason);
        }
    }
}
