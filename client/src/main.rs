use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use client::booking::{BookingPhase, SubmitOutcome};
use client::dashboard::{Overview, load_overview};
use client::records::{list_records, patient_chart, save_user, upload_record};
use client::routes::Navigation;
use client::{App, ClientError};
use shared::config::load_or_default;
use shared::types::{LoginData, NewRecord, RecordFile, Role};

#[derive(Parser)]
#[command(name = "mrms")]
#[command(about = "Command-line front-end for the medical records management system")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "MRMS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "MRMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the stored session
    Whoami,
    /// List doctors
    Doctors,
    /// Show free hours for a doctor on a date
    Slots {
        #[arg(short, long)]
        doctor: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
    /// Book an appointment
    Book {
        #[arg(short, long)]
        doctor: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// Hour of day, 0-23
        #[arg(long)]
        hour: u8,
        /// Required when staff book for a patient
        #[arg(short, long)]
        patient: Option<String>,
    },
    /// List your appointments, newest first
    Appointments,
    /// Cancel one of your appointments
    Cancel {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// System figures (admin) or your upcoming appointments and records
    Dashboard,
    /// List medical records, or one patient's chart
    Records {
        #[arg(short, long)]
        patient: Option<String>,
    },
    /// Upload a medical record for a patient
    AddRecord {
        #[arg(short, long)]
        patient: String,
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Attachment, may be repeated
        #[arg(short, long)]
        file: Vec<PathBuf>,
    },
    /// Show a user account (admin)
    User { id: String },
    /// Edit a user account (admin)
    UpdateUser {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Activate or deactivate a user account (admin)
    ToggleActive {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut app = App::from_config(&config);

    let mut busy = app.api().pending().subscribe();
    tokio::spawn(async move {
        while busy.changed().await.is_ok() {
            let count = *busy.borrow_and_update();
            debug!("{} request(s) in flight", count);
        }
    });

    let result = run(&mut app, cli.command).await;

    if app.drain_auth_events() > 0 {
        if let Some(notice) = app.navigator().notice() {
            eprintln!("{}", notice);
        }
    }

    result
}

async fn run(app: &mut App, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            let user = client::session::login(app.api(), &LoginData { email, password })
                .await
                .map_err(explain)?;
            let name = if user.name.is_empty() {
                "user"
            } else {
                user.name.as_str()
            };
            println!("Signed in as {} ({})", name, user.role);
        }

        Commands::Logout => {
            client::session::logout(app.session()).context("Failed to clear session")?;
            println!("Signed out");
        }

        Commands::Whoami => {
            if let Navigation::Redirect(_) = app.navigate("/") {
                println!("Not signed in");
                return Ok(());
            }
            let name = app.session().display_name().unwrap_or_default();
            match app.session().current_role() {
                Some(role) => println!("{} ({})", name, role),
                None => println!("{} (unknown role)", name),
            }
            for item in app.navigator().nav_items() {
                println!("  {:<14} {}", item.label, item.path);
            }
        }

        Commands::Doctors => {
            for doctor in app.api().doctors().await.map_err(explain)? {
                println!("{:<26} {}", doctor.id, doctor);
            }
        }

        Commands::Slots { doctor, date } => {
            let workflow = app.booking();
            workflow.select_date(date).await.map_err(explain)?;
            workflow.select_doctor(doctor).await.map_err(explain)?;

            let grid = workflow.slot_grid().await;
            if !grid.iter().any(|b| b.enabled) {
                println!("No free hours on {}", date);
            }
            for button in grid {
                let mark = if button.enabled { "free" } else { "-" };
                println!("{}  {}", button.label(), mark);
            }
        }

        Commands::Book {
            doctor,
            date,
            hour,
            patient,
        } => {
            let workflow = app.booking();
            workflow.select_date(date).await.map_err(explain)?;
            workflow.select_doctor(doctor).await.map_err(explain)?;
            workflow.select_patient(patient).await;
            workflow.select_hour(hour).await.map_err(explain)?;

            match workflow.submit().await.map_err(explain)? {
                SubmitOutcome::Booked(appointment) => {
                    info!("Booked {}", appointment.id);
                    println!("Booked: {}", appointment);
                }
                SubmitOutcome::AlreadySubmitting => bail!("A booking is already in progress"),
            }
            if let BookingPhase::Booked(_) = workflow.phase().await {
                print_appointments(app).await;
            }
        }

        Commands::Appointments => {
            app.appointments().refresh().await.map_err(explain)?;
            print_appointments(app).await;
        }

        Commands::Cancel { id, yes } => {
            let list = app.appointments();
            list.refresh().await.map_err(explain)?;
            let request = list.request_cancel(&id).await.map_err(explain)?;

            if !yes && !confirm(&format!("Cancel {}?", request.appointment()))? {
                request.dismiss();
                println!("Kept");
                return Ok(());
            }

            let updated = list.cancel(request.confirm()).await.map_err(explain)?;
            println!("Cancelled: {}", updated);
        }

        Commands::Dashboard => {
            let now = Local::now().naive_local();
            match load_overview(app.api(), now).await.map_err(explain)? {
                Overview::System(stats) => {
                    println!("Doctors       {}", stats.doctors);
                    println!("Patients      {}", stats.patients);
                    println!("Records       {}", stats.records);
                    println!("Appointments  {}", stats.appointments);
                    for month in &stats.appointments_per_month {
                        println!("  {:<10} {}", month.month, month.value);
                    }
                    for kind in &stats.records_by_type {
                        println!("  {:<10} {}", kind.label, kind.value);
                    }
                }
                Overview::Personal {
                    upcoming,
                    recent_records,
                } => {
                    println!("Upcoming appointments");
                    if upcoming.is_empty() {
                        println!("  none");
                    }
                    for appointment in upcoming.iter().take(5) {
                        println!("  {}", appointment);
                    }
                    if upcoming.len() > 5 {
                        println!("  and {} more", upcoming.len() - 5);
                    }
                    println!("Recent records");
                    if recent_records.is_empty() {
                        println!("  none");
                    }
                    for record in recent_records {
                        println!("  {}", record);
                    }
                }
            }
        }

        Commands::Records { patient } => {
            let records = match patient {
                Some(id) => {
                    let chart = patient_chart(app.api(), &id).await.map_err(explain)?;
                    println!("{}", chart.patient);
                    if let Some(contact) = &chart.patient.contact {
                        println!("Contact: {}", contact);
                    }
                    chart.records
                }
                None => list_records(app.api()).await.map_err(explain)?,
            };
            if records.is_empty() {
                println!("No records");
            }
            for record in records {
                println!("{:<26} {}", record.id, record);
            }
        }

        Commands::AddRecord {
            patient,
            title,
            description,
            file,
        } => {
            let files = file
                .iter()
                .map(|path| read_attachment(path))
                .collect::<Result<Vec<_>>>()?;
            let record = NewRecord {
                patient_id: patient,
                title,
                description,
                files,
            };
            let created = upload_record(app.api(), &record).await.map_err(explain)?;
            println!("Uploaded: {} ({})", created.title, created.id);
        }

        Commands::User { id } => {
            let user = app.api().user(&id).await.map_err(explain)?;
            println!("{}", user);
        }

        Commands::UpdateUser {
            id,
            name,
            email,
            role,
            active,
        } => {
            let current = app.api().user(&id).await.map_err(explain)?;
            let mut update = current.to_update();
            if let Some(name) = name {
                update.name = name;
            }
            if let Some(email) = email {
                update.email = email;
            }
            if let Some(role) = role {
                update.role = role;
            }
            if let Some(active) = active {
                update.active = active;
            }
            let saved = save_user(app.api(), &id, &update).await.map_err(explain)?;
            println!("Saved: {}", saved);
        }

        Commands::ToggleActive { id, yes } => {
            let user = app.api().user(&id).await.map_err(explain)?;
            let verb = if user.active { "Deactivate" } else { "Activate" };
            if !yes && !confirm(&format!("{} {}?", verb, user))? {
                println!("Unchanged");
                return Ok(());
            }
            let active = app.api().toggle_user_active(&id).await.map_err(explain)?;
            println!(
                "{} is now {}",
                user.name,
                if active { "active" } else { "inactive" }
            );
        }
    }

    Ok(())
}

async fn print_appointments(app: &App) {
    let items = app.appointments().snapshot().await;
    if items.is_empty() {
        println!("No appointments");
    }
    for appointment in items {
        println!("{:<26} {}", appointment.id, appointment);
    }
}

fn read_attachment(path: &Path) -> Result<RecordFile> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    };
    debug!("Attaching {} ({} bytes)", file_name, data.len());
    Ok(RecordFile {
        file_name,
        content_type: content_type.to_string(),
        data,
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().context("Failed to write prompt")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn explain(error: ClientError) -> anyhow::Error {
    let hint = match &error {
        ClientError::AuthExpired | ClientError::AuthRejected => " (run `mrms login`)",
        _ if error.is_retryable() => " (try again)",
        _ => "",
    };
    anyhow::anyhow!("{} [{}]{}", error, error.to_code(), hint)
}
