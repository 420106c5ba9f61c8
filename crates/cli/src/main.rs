//! Offline administration for a Cardio data directory.
//!
//! Reads the same environment as the server (`CARDIO_DATA_DIR`, `CARDIO_PUBLIC_URL`,
//! `CLERK_SECRET_KEY`, `CLERK_API_URL`, `HOSTING_URL`, `CARDIO_DEV_IDENTITY`). Do not run it against a directory a
//! live server is writing to.

use cardio_core::{
    resolve_data_dir, Application, ApplicationId, CardioServices, ClerkConfig, ClerkProvisioner,
    CoreConfig, Decision, IdentityProvisioner, InMemoryProvisioner, OrganizationId, PatientId,
    ServiceOptions, UnconfiguredProvisioner,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cardio")]
#[command(about = "Cardio hospital platform administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Review hospital onboarding applications
    Applications {
        #[command(subcommand)]
        command: ApplicationCommands,
    },
    /// Show an organization's subscription
    Subscription {
        /// Identity provider organization id
        org_id: String,
    },
    /// List a patient's records, newest first
    Records {
        /// Patient UUID
        patient_id: String,
    },
}

#[derive(Subcommand)]
enum ApplicationCommands {
    /// List all applications
    List,
    /// Show one application
    Show {
        /// Application UUID
        id: String,
    },
    /// Approve or decline an application
    Decide {
        /// Application UUID
        id: String,
        /// `approved` or `declined`
        decision: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("cardio_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'cardio --help' for commands");
        return Ok(());
    };

    let services = open_services()?;

    match command {
        Commands::Applications {
            command: ApplicationCommands::List,
        } => {
            let applications = services.applications.list()?;
            if applications.is_empty() {
                println!("No applications found.");
            }
            for application in applications {
                println!(
                    "{}  {:<8}  {}  ({})  submitted {}",
                    application.id,
                    application.status,
                    application.hospital.name,
                    application.doctor.email,
                    application.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::Applications {
            command: ApplicationCommands::Show { id },
        } => {
            let application = services.applications.get(id.parse::<ApplicationId>()?)?;
            print_application(&application);
        }
        Commands::Applications {
            command: ApplicationCommands::Decide { id, decision },
        } => {
            let id = id.parse::<ApplicationId>()?;
            let decision = decision.parse::<Decision>()?;
            match services.provisioning.decide(id, decision).await {
                Ok(outcome) => match outcome.hospital_id {
                    Some(hospital_id) => {
                        println!("Application {id} approved; hospital {hospital_id}")
                    }
                    None => println!("Application {id} {}", outcome.status),
                },
                Err(e) => {
                    eprintln!("Error deciding application {id}: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Subscription { org_id } => {
            let org_id = OrganizationId::new(org_id);
            match services.billing.check_subscription_status(Some(&org_id)) {
                Ok(status) => {
                    println!("Organization: {org_id}");
                    println!("Plan:         {}", status.plan_type);
                    println!("Status:       {:?}", status.status);
                    println!("Valid until:  {}", status.valid_until.format("%Y-%m-%d %H:%M"));
                    match status.features.record_limit {
                        Some(limit) => println!("Record limit: {limit}"),
                        None => println!("Record limit: unlimited"),
                    }
                }
                Err(e) => eprintln!("No subscription for {org_id}: {e}"),
            }
        }
        Commands::Records { patient_id } => {
            let patient_id = patient_id.parse::<PatientId>()?;
            let records = services.records.get_patient_records(patient_id)?;
            if records.is_empty() {
                println!("No records found.");
            }
            for record in records {
                println!(
                    "{}  risk {:>6.2}%  {:?}  {}",
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.risk,
                    record.condition_status,
                    record.notes.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

fn open_services() -> Result<CardioServices, Box<dyn std::error::Error>> {
    let data_dir = resolve_data_dir(std::env::var("CARDIO_DATA_DIR").ok());
    let public_url =
        std::env::var("CARDIO_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let cfg = Arc::new(CoreConfig::new(data_dir, public_url)?);

    let identity: Arc<dyn IdentityProvisioner> = match std::env::var("CLERK_SECRET_KEY") {
        Ok(secret) if !secret.trim().is_empty() => {
            let api_url = std::env::var("CLERK_API_URL")
                .unwrap_or_else(|_| "https://api.clerk.com/v1".into());
            let config = ClerkConfig::new(api_url, secret)?
                .with_redirect_url(std::env::var("HOSTING_URL").ok());
            Arc::new(ClerkProvisioner::new(config)?)
        }
        _ if std::env::var("CARDIO_DEV_IDENTITY").is_ok_and(|v| v.trim() == "1") => {
            eprintln!("CARDIO_DEV_IDENTITY=1; approvals will use throwaway identities");
            Arc::new(InMemoryProvisioner::new())
        }
        _ => Arc::new(UnconfiguredProvisioner),
    };

    Ok(CardioServices::open(
        cfg,
        identity,
        ServiceOptions::default(),
    )?)
}

fn print_application(application: &Application) {
    let h = &application.hospital;
    let d = &application.doctor;
    println!("Application:  {}", application.id);
    println!("Status:       {}", application.status);
    println!("Hospital:     {} ({})", h.name, h.hospital_type);
    println!("Location:     {}, {}, {} {}", h.city, h.state, h.country, h.postal_code);
    println!("Contact:      {} / {}", h.email, h.phone);
    println!("Registration: {}", h.registration_number);
    if let Some(tax_id) = &h.tax_id {
        println!("Tax id:       {tax_id}");
    }
    if let Some(website) = &h.website {
        println!("Website:      {website}");
    }
    println!(
        "Doctor:       {} <{}> {}, {} (licence {})",
        d.name, d.email, d.phone, d.specialization, d.license_number
    );
    if let Some(progress) = &application.provisioning {
        println!(
            "Provisioning: user {:?}, org {:?}, invited {}",
            progress.external_user_id.as_ref().map(|u| u.as_str()),
            progress.org_id.as_ref().map(|o| o.as_str()),
            progress.invitation_sent
        );
    }
    if let Some(decided_at) = application.decided_at {
        println!("Decided:      {}", decided_at.format("%Y-%m-%d %H:%M"));
    }
}
