mod config;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use lockgate_client::{license_data_json, LicenseClient};
use lockgate_core::keys::{
    generate_keypair, private_key_from_pem, public_key_from_pem, private_key_to_pem,
    public_key_to_pem, KeyEncoding,
};
use lockgate_core::{
    activation, fingerprint, inspect, IssueRequest, LicenseClaims, LicenseIssuer,
    LicenseVerifier, SignatureAlgorithm, Validity,
};

use crate::config::AdminConfig;

#[derive(Parser)]
#[command(name = "lockgate-admin", about = "lockgate License Administration Tool")]
struct Cli {
    /// JSON config file with key paths, algorithm and issuer
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyFormat {
    Pkcs1,
    Pkcs8,
}

impl From<KeyFormat> for KeyEncoding {
    fn from(format: KeyFormat) -> Self {
        match format {
            KeyFormat::Pkcs1 => KeyEncoding::Pkcs1,
            KeyFormat::Pkcs8 => KeyEncoding::Pkcs8,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an RSA keypair for license signing
    Keygen {
        /// Key size in bits
        #[arg(long, default_value = "4096")]
        bits: usize,
        /// Output directory for key files
        #[arg(long, default_value = ".")]
        output_dir: String,
        /// PEM encoding of the written keys
        #[arg(long, value_enum, default_value = "pkcs8")]
        format: KeyFormat,
    },

    /// Print the activation code of this machine
    Fingerprint {
        /// Print the 20-character hex form bound into licenses instead
        #[arg(long)]
        hex: bool,
    },

    /// Decode an activation code to its hex fingerprint
    Decode {
        /// Activation code (XXXX-XXXX-XXXX-XXXX)
        code: String,
    },

    /// Issue a signed license bound to an activation code
    Issue {
        /// Customer name
        #[arg(long)]
        customer: String,
        /// Activation code of the target machine. Use --auto for this machine.
        #[arg(long, required_unless_present = "auto")]
        fingerprint: Option<String>,
        /// Bind to this machine's activation code
        #[arg(long)]
        auto: bool,
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        days: i64,
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        hours: i64,
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        minutes: i64,
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        seconds: i64,
        /// Issuer identifier (default from config, then "lockgate")
        #[arg(long)]
        issuer: Option<String>,
        /// Subject claim (defaults to the customer name)
        #[arg(long)]
        subject: Option<String>,
        /// Extra metadata as a JSON object
        #[arg(long)]
        meta: Option<String>,
        /// Path to private key PEM file
        #[arg(long)]
        private_key: Option<String>,
        /// Signature algorithm (PS256 or RS256)
        #[arg(long)]
        algorithm: Option<SignatureAlgorithm>,
        /// Output file for the license token
        #[arg(long, default_value = "license.lic")]
        output: String,
    },

    /// Verify a license file against a public key and a fingerprint
    Verify {
        /// License file to verify
        #[arg(long)]
        license: String,
        /// Path to public key PEM file
        #[arg(long)]
        public_key: Option<String>,
        /// Signature algorithm (PS256 or RS256)
        #[arg(long)]
        algorithm: Option<SignatureAlgorithm>,
        /// Activation code to check against (defaults to this machine)
        #[arg(long)]
        fingerprint: Option<String>,
    },

    /// Verify a license for this machine and store it
    Activate {
        /// License file received from the administrator
        #[arg(long)]
        license: String,
        /// Path to public key PEM file
        #[arg(long)]
        public_key: Option<String>,
        /// Signature algorithm (PS256 or RS256)
        #[arg(long)]
        algorithm: Option<SignatureAlgorithm>,
        /// Where to store the activated license
        #[arg(long)]
        store: Option<String>,
    },

    /// Show the claims of a license without verifying it
    Inspect {
        /// License file to inspect
        #[arg(long)]
        license: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = AdminConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Keygen {
            bits,
            output_dir,
            format,
        } => cmd_keygen(bits, &output_dir, format.into()),
        Commands::Fingerprint { hex } => cmd_fingerprint(hex),
        Commands::Decode { code } => cmd_decode(&code),
        Commands::Issue {
            customer,
            fingerprint: code,
            auto,
            days,
            hours,
            minutes,
            seconds,
            issuer,
            subject,
            meta,
            private_key,
            algorithm,
            output,
        } => {
            let fingerprint = if auto {
                fingerprint::generate_fingerprint()
            } else {
                code.context("--fingerprint is required")?
            };
            let validity = Validity {
                days,
                hours,
                minutes,
                seconds,
            };
            let mut request = IssueRequest::new(customer, fingerprint, validity);
            if let Some(subject) = subject {
                request = request.with_subject(subject);
            }
            if let Some(meta) = meta {
                request = request.with_meta(parse_meta(&meta)?);
            }
            cmd_issue(
                &request,
                &config.private_key_path(private_key),
                config.algorithm(algorithm),
                &config.issuer(issuer),
                &output,
            )
        }
        Commands::Verify {
            license,
            public_key,
            algorithm,
            fingerprint,
        } => cmd_verify(
            &license,
            &config.public_key_path(public_key),
            config.algorithm(algorithm),
            fingerprint,
        ),
        Commands::Activate {
            license,
            public_key,
            algorithm,
            store,
        } => cmd_activate(
            &license,
            &config.public_key_path(public_key),
            config.algorithm(algorithm),
            &config.license_store_path(store),
        ),
        Commands::Inspect { license } => cmd_inspect(&license),
    }
}

fn cmd_keygen(bits: usize, output_dir: &str, encoding: KeyEncoding) -> Result<()> {
    println!("Generating {}-bit RSA keypair...", bits);
    let (private, public) = generate_keypair(bits)?;

    let priv_pem = private_key_to_pem(&private, encoding)?;
    let pub_pem = public_key_to_pem(&public, encoding)?;

    let output_dir = Path::new(output_dir);
    let priv_path = output_dir.join(config::DEFAULT_PRIVATE_KEY);
    let pub_path = output_dir.join(config::DEFAULT_PUBLIC_KEY);

    std::fs::create_dir_all(output_dir)?;
    std::fs::write(&priv_path, &priv_pem)
        .with_context(|| format!("Failed to write {}", priv_path.display()))?;
    std::fs::write(&pub_path, &pub_pem)
        .with_context(|| format!("Failed to write {}", pub_path.display()))?;

    println!("Private key: {}", priv_path.display());
    println!("Public key:  {}", pub_path.display());
    println!();
    println!("IMPORTANT: Keep private.pem secure! Only distribute public.pem.");
    Ok(())
}

fn cmd_fingerprint(hex: bool) -> Result<()> {
    if hex {
        println!("{}", fingerprint::local_fingerprint_hex());
    } else {
        println!("{}", fingerprint::generate_fingerprint());
    }
    Ok(())
}

fn cmd_decode(code: &str) -> Result<()> {
    let hex = activation::decode(code).with_context(|| format!("Invalid activation code: {}", code))?;
    println!("{}", hex);
    Ok(())
}

fn cmd_issue(
    request: &IssueRequest,
    private_key_path: &str,
    algorithm: SignatureAlgorithm,
    issuer: &str,
    output: &str,
) -> Result<()> {
    let priv_pem = std::fs::read(private_key_path)
        .with_context(|| format!("Failed to read private key from {}", private_key_path))?;
    let private_key = private_key_from_pem(&priv_pem)
        .with_context(|| format!("Failed to load private key from {}", private_key_path))?;

    let issuer = LicenseIssuer::new(private_key, algorithm, issuer);
    let claims = issuer.build_claims(request)?;
    let token = issuer.sign_claims(&claims)?;

    std::fs::write(output, &token)
        .with_context(|| format!("Failed to write license to {}", output))?;

    println!("License written to: {}", output);
    print_claims(&claims);
    println!("  Algorithm:   {}", algorithm);
    Ok(())
}

fn cmd_verify(
    license_path: &str,
    public_key_path: &str,
    algorithm: SignatureAlgorithm,
    code: Option<String>,
) -> Result<()> {
    let token = read_license(license_path)?;
    let pub_pem = std::fs::read(public_key_path)
        .with_context(|| format!("Failed to read public key from {}", public_key_path))?;
    let public_key = public_key_from_pem(&pub_pem)
        .with_context(|| format!("Failed to load public key from {}", public_key_path))?;

    let local = match code {
        Some(code) => activation::decode(&code)
            .with_context(|| format!("Invalid activation code: {}", code))?,
        None => fingerprint::local_fingerprint_hex(),
    };

    let result = LicenseVerifier::new(public_key, algorithm).verify(&token, &local);
    println!("Status: {} (code {})", result.status(), result.status().code());
    if let Some(claims) = result.claims() {
        print_claims(claims);
    }
    if !result.is_valid() {
        bail!("License is not valid: {}", result.status());
    }
    Ok(())
}

fn cmd_activate(
    license_path: &str,
    public_key_path: &str,
    algorithm: SignatureAlgorithm,
    store_path: &str,
) -> Result<()> {
    let token = read_license(license_path)?;
    let pub_pem = std::fs::read_to_string(public_key_path)
        .with_context(|| format!("Failed to read public key from {}", public_key_path))?;
    let client = LicenseClient::new(&pub_pem, algorithm)
        .with_context(|| format!("Failed to load public key from {}", public_key_path))?;

    let result = client
        .activate(&token, Path::new(store_path))
        .with_context(|| format!("Failed to store license at {}", store_path))?;
    if !result.is_valid() {
        bail!("Activation refused: {}", result.status());
    }
    println!("License activated and stored at: {}", store_path);
    println!("{}", license_data_json(&result));
    Ok(())
}

fn cmd_inspect(license_path: &str) -> Result<()> {
    let token = read_license(license_path)?;
    let claims = inspect(&token).context("License claims could not be decoded")?;
    println!("UNVERIFIED license contents:");
    print_claims(&claims);
    if let Some(meta) = &claims.meta {
        println!("  Meta:        {}", serde_json::to_string(meta)?);
    }
    Ok(())
}

fn read_license(path: &str) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read license from {}", path))?;
    Ok(content.trim().to_string())
}

fn parse_meta(raw: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Invalid --meta JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("--meta must be a JSON object"),
    }
}

fn print_claims(claims: &LicenseClaims) {
    println!("  Issuer:      {}", claims.issuer);
    println!("  Customer:    {}", claims.customer);
    println!("  Fingerprint: {}", display_fingerprint(&claims.fingerprint));
    println!("  Issued:      {}", format_timestamp(claims.issued(), claims.issued_at));
    println!("  Expires:     {}", format_timestamp(claims.expires(), claims.expires_at));
}

fn display_fingerprint(hex: &str) -> String {
    if hex.is_empty() {
        return "(any machine)".to_string();
    }
    match activation::from_hex(hex) {
        Ok(code) => format!("{} ({})", code, hex),
        Err(_) => hex.to_string(),
    }
}

fn format_timestamp(time: Option<DateTime<Utc>>, secs: i64) -> String {
    time.map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}
