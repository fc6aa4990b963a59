use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rollcall_core::{EncodingCache, FacePipeline, RecognitionConfig};
use rollcall_hw::Camera;
use rollcall_store::export::{record_row, HEADERS};
use rollcall_store::{
    add_student, delete_student, export_records, update_student, AttendanceStatus, ConfigFile,
    DatabaseConfig, ExportFormat, FirebaseStore, StudentForm, StudentRecord, StudentStore,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rollcall",
    version = env!("CARGO_PKG_VERSION"),
    about = "Manage student attendance records and face encodings"
)]
struct Cli {
    /// Configuration file (default: $ROLLCALL_CONFIG, then ./rollcall.toml)
    #[arg(global = true, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode reference images and write the encodings file
    Encode {
        /// Reference image directory
        #[arg(long)]
        images: Option<PathBuf>,
        /// Encodings file to write
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory holding the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Add a student (overwrites an existing record with the same id)
    Add(RecordArgs),
    /// Update a student; omitted fields keep their current values
    Update(RecordArgs),
    /// Delete a student
    Delete {
        /// Student id
        id: String,
    },
    /// List all students
    List,
    /// Show one student
    Show {
        /// Student id
        id: String,
    },
    /// Export all students to a spreadsheet
    Export {
        /// Output file
        #[arg(short, long, default_value = "attendance.xlsx")]
        output: PathBuf,
        /// xlsx or csv (default: from the file extension, else xlsx)
        #[arg(short, long)]
        format: Option<ExportFormat>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Args)]
struct RecordArgs {
    /// Student id (database key)
    id: String,
    #[arg(short, long, default_value = "")]
    name: String,
    #[arg(short, long, default_value = "")]
    branch: String,
    /// P (present), A (absent) or E (excused)
    #[arg(short, long)]
    status: Option<AttendanceStatus>,
    /// Total attendance count
    #[arg(short, long)]
    total: Option<u32>,
}

impl From<RecordArgs> for StudentForm {
    fn from(args: RecordArgs) -> Self {
        StudentForm {
            id: args.id,
            name: args.name,
            branch: args.branch,
            status: args.status,
            total: args.total,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => ConfigFile::read(path)?,
        None => ConfigFile::discover()?,
    };

    match cli.command {
        Commands::Encode {
            images,
            output,
            model_dir,
        } => {
            let mut config = file.section::<RecognitionConfig>("recognition")?.with_env();
            if let Some(images) = images {
                config.images_dir = images;
            }
            if let Some(output) = output {
                config.encodings_file = output;
            }
            if let Some(model_dir) = model_dir {
                config.model_dir = model_dir;
            }
            encode(&config)?;
        }
        Commands::Add(args) => {
            let store = connect(&file)?;
            let record = add_student(&store, &args.into(), Local::now().naive_local()).await?;
            println!("Added {}", record.id);
            print_table(std::iter::once(&record));
        }
        Commands::Update(args) => {
            let store = connect(&file)?;
            let record = update_student(&store, &args.into(), Local::now().naive_local()).await?;
            println!("Updated {}", record.id);
            print_table(std::iter::once(&record));
        }
        Commands::Delete { id } => {
            let store = connect(&file)?;
            if delete_student(&store, &id).await? {
                println!("Deleted {id}");
            } else {
                println!("No student with id {id}");
            }
        }
        Commands::List => {
            let store = connect(&file)?;
            let records = store.list().await?;
            if records.is_empty() {
                println!("No students");
            } else {
                print_table(records.values());
                println!("{} student(s)", records.len());
            }
        }
        Commands::Show { id } => {
            let store = connect(&file)?;
            match store.get(&id).await? {
                Some(record) => print_table(std::iter::once(&record)),
                None => anyhow::bail!("no student with id {id}"),
            }
        }
        Commands::Export { output, format } => {
            let store = connect(&file)?;
            let format = format
                .or_else(|| ExportFormat::from_path(&output))
                .unwrap_or_default();
            let records = store.list().await?;
            let rows = export_records(&records, &output, format)
                .with_context(|| format!("exporting to {}", output.display()))?;
            println!("Exported {rows} student(s) to {}", output.display());
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

fn connect(file: &ConfigFile) -> Result<FirebaseStore> {
    let config = DatabaseConfig::load(file)?;
    FirebaseStore::connect(&config).context("connecting to the database")
}

fn encode(config: &RecognitionConfig) -> Result<()> {
    let mut pipeline =
        FacePipeline::load(&config.model_dir, config.min_confidence).context("loading face models")?;
    let cache = EncodingCache::build(&config.images_dir, &mut pipeline)
        .with_context(|| format!("encoding reference images in {}", config.images_dir.display()))?;
    cache
        .save(&config.encodings_file)
        .with_context(|| format!("writing {}", config.encodings_file.display()))?;

    println!(
        "Encoded {} student(s) into {}",
        cache.len(),
        config.encodings_file.display()
    );
    for identity in cache.identities() {
        println!("  {identity}");
    }
    Ok(())
}

fn print_table<'a>(records: impl Iterator<Item = &'a StudentRecord>) {
    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.len()).collect();
    let rows: Vec<[String; 6]> = records.map(record_row).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    print_row(HEADERS.iter().copied(), &widths);
    for row in &rows {
        print_row(row.iter().map(String::as_str), &widths);
    }
}

fn print_row<'s>(cells: impl Iterator<Item = &'s str>, widths: &[usize]) {
    let out: Vec<String> = cells
        .zip(widths)
        .map(|(c, w)| format!("{c:<w$}", w = *w))
        .collect();
    println!("{}", out.join("  ").trim_end());
}
