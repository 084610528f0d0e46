//! eStream CLI — trust-tiered signing and device fingerprinting
//!
//! Commands:
//!   estream probe       — show device capability and trust level
//!   estream enroll      — create the identity key
//!   estream sign        — sign a message with the identity key
//!   estream governance  — sign a replay-stamped governance action
//!   estream approve     — approve or reject a pending request
//!   estream fingerprint — collect a device fingerprint
//!   estream compare     — similarity of two saved fingerprints
//!   estream submit      — submit a saved fingerprint to the lattice
//!   estream demo        — run the full flow end to end
//!
//! Signing runs against the simulated secure element; keys live for one
//! invocation only.

use estream_mobile_core::fingerprint::{
    compare, CollectionProgress, DeviceFingerprint, EnvironmentContext, SimulatedSampler,
    RATIO_NAMES,
};
use estream_mobile_core::hardware::{
    BiometricModality, PresenceOutcome, SecurityCapability, SimulatedHardware,
};
use estream_mobile_core::signing::{action_hash, GovernanceAction};
use estream_mobile_core::wallet::SimulatedWallet;
use estream_mobile_core::{ServiceContext, SignatureResult, SignerBackend, TrustConfig};
use std::env;
use std::sync::Arc;

const CONFIG_FILE: &str = "estream.json";
const DEVICE_MODEL: &str = "simulated-device";

fn print_usage() {
    println!(
        r#"
eStream mobile core v{}

Usage: estream <command> [options]

Commands:
  probe        [--delegated]                         Show capability and trust level
  enroll       [--no-biometric]                      Create the identity key
  sign         <message> [--dismiss]                 Sign a message
  governance   <type> <operation> [key=value...] [--dismiss]
                                                     Sign a governance action
  approve      <request-id> <approve|reject>         Approve or reject a request
  fingerprint  [samples] [out.json]                  Collect a device fingerprint
  compare      <a.json> <b.json>                     Compare two fingerprints
  submit       <fingerprint.json> [battery-level]    Submit to the lattice
  demo                                               Run the full flow

Config is read from {} when present; ESTREAM_* variables override it.

Examples:
  estream governance node restart nodeId=n-17
  estream approve 6f1c0e reject
  estream fingerprint 1000 mine.json
  estream compare mine.json theirs.json
"#,
        env!("CARGO_PKG_VERSION"),
        CONFIG_FILE
    );
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "probe" => cmd_probe(&args[2..]).await,
        "enroll" => cmd_enroll(&args[2..]).await,
        "sign" => cmd_sign(&args[2..]).await,
        "governance" => cmd_governance(&args[2..]).await,
        "approve" => cmd_approve(&args[2..]).await,
        "fingerprint" => cmd_fingerprint(&args[2..]).await,
        "compare" => cmd_compare(&args[2..]),
        "submit" => cmd_submit(&args[2..]).await,
        "demo" => cmd_demo().await,
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
        }
    }
}

fn load_config() -> Option<TrustConfig> {
    match TrustConfig::load_or_default(CONFIG_FILE) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("  Invalid configuration: {}", e);
            None
        }
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn positional(args: &[String]) -> Vec<&String> {
    args.iter().filter(|a| !a.starts_with("--")).collect()
}

/// Context on simulated secure hardware; the handle scripts prompt outcomes
fn enclave_context() -> Option<(ServiceContext, Arc<SimulatedHardware>)> {
    let config = load_config()?;
    let hardware = Arc::new(SimulatedHardware::new(SecurityCapability::secure_with(
        BiometricModality::Fingerprint,
    )));
    let backend = SignerBackend::Enclave {
        hardware: hardware.clone(),
    };
    match ServiceContext::new(config, backend, Arc::new(SimulatedSampler::new(DEVICE_MODEL))) {
        Ok(ctx) => Some((ctx, hardware)),
        Err(e) => {
            eprintln!("  Failed to start: {}", e);
            None
        }
    }
}

fn delegated_context() -> Option<ServiceContext> {
    let config = load_config()?;
    let backend = SignerBackend::Delegated {
        hardware: Arc::new(SimulatedHardware::new(SecurityCapability::software_only())),
        wallet: Arc::new(SimulatedWallet::new("estream-cli")),
    };
    match ServiceContext::new(config, backend, Arc::new(SimulatedSampler::new(DEVICE_MODEL))) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("  Failed to start: {}", e);
            None
        }
    }
}

/// Enroll when no identity key exists yet
async fn ensure_enrolled(ctx: &ServiceContext) -> bool {
    if ctx.signer().has_identity_key().await {
        return true;
    }
    match ctx.signer().enroll(ctx.config().require_biometric).await {
        Ok(key) => {
            println!("  Enrolled identity key {}", key.public_key_hex());
            true
        }
        Err(e) => {
            eprintln!("  Enrollment failed: {}", e);
            false
        }
    }
}

fn print_result(result: &SignatureResult) {
    println!("  Request:   {}", result.request_id);
    println!("  Trace:     {:?}", result.trace);
    if result.success {
        println!("  Signature: {}", result.signature.as_deref().unwrap_or("-"));
    } else if result.cancelled {
        println!("  Cancelled by user");
    } else {
        println!(
            "  Failed:    {} ({})",
            result.error_message.as_deref().unwrap_or("unknown"),
            result
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    if let Some(hash) = &result.action_hash {
        println!("  Action:    {}", hash);
    }
    if let Some(action) = &result.signed_action {
        println!("  Nonce:     {} @ {}", action.nonce, action.timestamp);
    }
}

fn load_fingerprint(path: &str) -> Option<DeviceFingerprint> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("  Cannot read {}: {}", path, e);
            return None;
        }
    };
    match serde_json::from_str::<DeviceFingerprint>(&data) {
        Ok(fp) => {
            if !fp.hash_is_consistent() {
                eprintln!("  Warning: {} hash does not match its ratios", path);
            }
            Some(fp)
        }
        Err(e) => {
            eprintln!("  {} is not a fingerprint: {}", path, e);
            None
        }
    }
}

async fn cmd_probe(args: &[String]) {
    let ctx = if has_flag(args, "--delegated") {
        delegated_context()
    } else {
        enclave_context().map(|(ctx, _)| ctx)
    };
    let Some(ctx) = ctx else { return };

    let cap = ctx.signer().capability().await;
    let caps = ctx.signer().capabilities();
    println!("  Secure hardware:   {}", cap.has_secure_hardware);
    println!(
        "  Biometrics:        {} ({})",
        cap.has_biometric_hardware,
        cap.modality.name()
    );
    if let Some(msg) = &cap.error_message {
        println!("  Probe error:       {}", msg);
    }
    println!("  Local keys:        {}", caps.local_keys);
    println!("  Governance:        {}", caps.governance_signing);
    println!("  Transactions:      {}", caps.transaction_signing);
    println!("  Trust level:       {}", ctx.signer().trust_level().await.name());
}

async fn cmd_enroll(args: &[String]) {
    let Some((ctx, _hw)) = enclave_context() else { return };
    let biometric = !has_flag(args, "--no-biometric");
    match ctx.signer().enroll(biometric).await {
        Ok(key) => {
            println!("  Alias:      {}", key.alias);
            println!("  Public key: {}", key.public_key_hex());
            println!("  Biometric:  {}", key.requires_biometric);
            println!("  Hardware:   {}", key.backed_by_secure_hardware);
            println!("  Trust:      {}", ctx.signer().trust_level().await.name());
        }
        Err(e) => eprintln!("  Enrollment failed: {}", e),
    }
}

async fn cmd_sign(args: &[String]) {
    let pos = positional(args);
    let Some(message) = pos.first() else {
        eprintln!("Usage: estream sign <message> [--dismiss]");
        return;
    };
    let Some((ctx, hw)) = enclave_context() else { return };
    if !ensure_enrolled(&ctx).await {
        return;
    }
    if has_flag(args, "--dismiss") {
        hw.push_presence(PresenceOutcome::dismissed());
    }
    let result = ctx.signer().sign_message(message.as_bytes()).await;
    print_result(&result);
}

async fn cmd_governance(args: &[String]) {
    let pos = positional(args);
    if pos.len() < 2 {
        eprintln!("Usage: estream governance <type> <operation> [key=value...] [--dismiss]");
        return;
    }
    let mut action = GovernanceAction::new(pos[0].as_str(), pos[1].as_str());
    for param in &pos[2..] {
        let Some((key, raw)) = param.split_once('=') else {
            eprintln!("  Ignoring parameter '{}': expected key=value", param);
            continue;
        };
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        action = action.with_param(key, value);
    }

    let Some((ctx, hw)) = enclave_context() else { return };
    if !ensure_enrolled(&ctx).await {
        return;
    }
    if has_flag(args, "--dismiss") {
        hw.push_presence(PresenceOutcome::dismissed());
    }
    let result = ctx.signer().sign_governance_action(action).await;
    print_result(&result);
    if let Some(action) = &result.signed_action {
        if let Ok(bytes) = action.canonical_bytes() {
            println!("  Payload:   {}", String::from_utf8_lossy(&bytes));
            println!("  Rehash ok: {}", Some(action_hash(&bytes)) == result.action_hash);
        }
    }
}

async fn cmd_approve(args: &[String]) {
    if args.len() < 2 {
        eprintln!("Usage: estream approve <request-id> <approve|reject>");
        return;
    }
    let approve = match args[1].as_str() {
        "approve" | "yes" | "true" => true,
        "reject" | "no" | "false" => false,
        other => {
            eprintln!("  Unknown decision '{}': use approve or reject", other);
            return;
        }
    };
    let Some((ctx, _hw)) = enclave_context() else { return };
    if !ensure_enrolled(&ctx).await {
        return;
    }
    let result = ctx
        .signer()
        .sign_governance_action(GovernanceAction::approval(args[0].as_str(), approve))
        .await;
    print_result(&result);
}

async fn cmd_fingerprint(args: &[String]) {
    let Some((ctx, _hw)) = enclave_context() else { return };
    let samples = match args.first().map(|s| s.parse::<u32>()) {
        None => None,
        Some(Ok(n)) => Some(n),
        Some(Err(_)) => {
            eprintln!("  samples must be a number");
            return;
        }
    };

    let sink = |p: CollectionProgress| {
        println!("  [{:>5.1}%] {}", p.fraction * 100.0, p.operation);
    };
    let fp = match ctx.collect_fingerprint(samples, Some(&sink)).await {
        Ok(fp) => fp,
        Err(e) => {
            eprintln!("  Collection failed: {}", e);
            return;
        }
    };

    println!("  Fingerprint {} ({} samples)", fp.id, fp.sample_count);
    println!("  Hash: {}", fp.fingerprint_hash);
    for (name, ratio) in RATIO_NAMES.iter().zip(&fp.stable_ratios) {
        println!("    {:<22} {:.6}", name, ratio);
    }

    if let Some(out) = args.get(1) {
        match serde_json::to_string_pretty(&fp) {
            Ok(json) => match std::fs::write(out, json) {
                Ok(()) => println!("  Saved to {}", out),
                Err(e) => eprintln!("  Failed to save: {}", e),
            },
            Err(e) => eprintln!("  Failed to encode: {}", e),
        }
    }
}

fn cmd_compare(args: &[String]) {
    if args.len() < 2 {
        eprintln!("Usage: estream compare <a.json> <b.json>");
        return;
    }
    let (Some(a), Some(b)) = (load_fingerprint(&args[0]), load_fingerprint(&args[1])) else {
        return;
    };
    let similarity = compare(&a, &b);
    println!("  {} vs {}", a.device_model, b.device_model);
    println!("  Similarity: {:.4}", similarity);
    println!("  Same hash:  {}", a.fingerprint_hash == b.fingerprint_hash);
}

async fn cmd_submit(args: &[String]) {
    let Some(path) = args.first() else {
        eprintln!("Usage: estream submit <fingerprint.json> [battery-level]");
        return;
    };
    let Some(fp) = load_fingerprint(path) else { return };
    let context = match args.get(1).map(|s| s.parse::<f64>()) {
        None => None,
        Some(Ok(level)) => Some(EnvironmentContext {
            battery_level: Some(level),
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            ..Default::default()
        }),
        Some(Err(_)) => {
            eprintln!("  battery-level must be a number in [0, 1]");
            return;
        }
    };

    let Some((ctx, _hw)) = enclave_context() else { return };
    println!("  Submitting to {}", ctx.lattice().submission_url());
    match ctx.submit_fingerprint(&fp, context).await {
        Ok(true) => println!("  Accepted"),
        Ok(false) => println!("  Not accepted (see log)"),
        Err(e) => eprintln!("  Cannot submit: {}", e),
    }
}

async fn cmd_demo() {
    println!("\n=== Enclave custody ===");
    let Some((ctx, hw)) = enclave_context() else { return };
    if !ensure_enrolled(&ctx).await {
        return;
    }
    println!("  Trust level: {}", ctx.signer().trust_level().await.name());

    println!("\n--- Governance action, accepted ---");
    let action = GovernanceAction::new("node", "restart").with_param("nodeId", "n-17");
    let accepted = ctx.signer().sign_governance_action(action.clone()).await;
    print_result(&accepted);

    println!("\n--- Governance action, dismissed ---");
    hw.push_presence(PresenceOutcome::dismissed());
    print_result(&ctx.signer().sign_governance_action(action.clone()).await);

    println!("\n--- Retry ---");
    let retry = ctx.signer().sign_governance_action(action).await;
    print_result(&retry);
    if let (Some(a), Some(b)) = (&accepted.signed_action, &retry.signed_action) {
        println!("  Fresh nonce: {}", a.nonce != b.nonce);
    }

    println!("\n--- Transaction on enclave custody ---");
    print_result(&ctx.signer().sign_transaction(b"demo-tx").await);

    println!("\n=== Delegated custody ===");
    let Some(delegated) = delegated_context() else { return };
    println!("  Trust level: {}", delegated.signer().trust_level().await.name());
    print_result(&delegated.signer().sign_and_send_transaction(b"demo-tx").await);
    print_result(
        &delegated
            .signer()
            .sign_governance_action(GovernanceAction::approval("req-1", true))
            .await,
    );
    match delegated.signer().disconnect().await {
        Ok(()) => println!("  Wallet session ended"),
        Err(e) => eprintln!("  Disconnect failed: {}", e),
    }

    println!("\n=== Fingerprint ===");
    let first = ctx.collect_fingerprint(Some(200), None).await;
    let second = ctx.collect_fingerprint(Some(200), None).await;
    match (first, second) {
        (Ok(a), Ok(b)) => {
            println!("  Hash:       {}", a.fingerprint_hash);
            println!("  Self-match: {:.4}", compare(&a, &b));
            println!("  Submitting to {}", ctx.lattice().submission_url());
            match ctx.submit_fingerprint(&a, None).await {
                Ok(accepted) => println!("  Accepted:   {}", accepted),
                Err(e) => eprintln!("  Cannot submit: {}", e),
            }
        }
        (Err(e), _) | (_, Err(e)) => eprintln!("  Collection failed: {}", e),
    }
}
