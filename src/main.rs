use std::path::{Path, PathBuf};

use base64::Engine as _;
use clap::{Parser, Subcommand};
use pdfqr::configuration::Settings;
use pdfqr::error::{ContextError, ErrorKind};
use pdfqr::service::{DocumentService, ServeOutcome, SubmissionRequest};
use pdfqr::storage::DirectoryStore;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CliArguments {
    /// Directory holding the stored documents and their records
    #[arg(short = 's', long = "store", value_name = "directory", default_value = "pdfqr-store")]
    store_path: PathBuf,
    /// Base URL of the viewer and download links encoded in the QR codes
    #[arg(long = "site-url", value_name = "url", default_value = "http://localhost:3000")]
    site_url: String,
    /// JSON file overriding the default settings
    #[arg(short = 'c', long = "configuration", value_name = "json_file")]
    configuration_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates, stamps and stores a new document
    Create {
        /// One of: builder, json, upload
        #[arg(short = 'm', long = "method")]
        method: String,
        /// Builder fields or JSON definition, or the PDF file to upload
        #[arg(short = 'i', long = "input", value_name = "file_path")]
        input_path: PathBuf,
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
        /// JSON file with the QR options (`qrSize`, `page1Pos`, `page2Pos`)
        #[arg(long = "qr-options", value_name = "json_file")]
        qr_options_path: Option<PathBuf>,
    },
    /// Lists the stored documents, the most recent first
    List,
    /// Shows the record of a stored document
    Show { id: String },
    /// Writes a stored document, or one of its pages, to a file
    Serve {
        id: String,
        /// 1-based page number
        #[arg(short = 'p', long = "page")]
        page: Option<String>,
        #[arg(short = 'd', long = "download")]
        download: bool,
        #[arg(short = 'o', long = "output", value_name = "file_path")]
        output_file_path: PathBuf,
    },
    /// Deletes a stored document and its record
    Delete { id: String },
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ContextError> {
    std::fs::read(path).map_err(|error| {
        ContextError::with_error(
            ErrorKind::InvalidRequest,
            format!("Unable to read the file {:?}", path),
            &error,
        )
    })
}

fn read_json_file(path: &Path) -> Result<serde_json::Value, ContextError> {
    serde_json::from_slice(&read_file(path)?).map_err(|error| {
        ContextError::with_error(
            ErrorKind::InvalidRequest,
            format!("Unable to parse the JSON file {:?}", path),
            &error,
        )
    })
}

fn print_json(value: &impl serde::Serialize) -> Result<(), ContextError> {
    let json = serde_json::to_string_pretty(value).map_err(|error| {
        ContextError::with_error(ErrorKind::Serialization, "Unable to format the output", &error)
    })?;
    println!("{}", json);
    Ok(())
}

/// Turns the input file of the `create` subcommand into the data of a submission: uploaded
/// files are sent in base64, everything else is read as JSON.
fn submission_data(
    method: &str,
    input_path: &Path,
    qr_options_path: Option<&Path>,
) -> Result<serde_json::Value, ContextError> {
    let mut data = if method == "upload" {
        let encoded = base64::engine::general_purpose::STANDARD.encode(read_file(input_path)?);
        serde_json::json!({ "base64": encoded })
    } else {
        read_json_file(input_path)?
    };

    if let Some(qr_options_path) = qr_options_path {
        let qr_options = read_json_file(qr_options_path)?;
        match data.as_object_mut() {
            Some(object) => {
                object.insert("qrOptions".to_string(), qr_options);
            }
            None => {
                return Err(ContextError::with_context(
                    ErrorKind::InvalidRequest,
                    format!("The input {:?} is not a JSON object", input_path),
                ))
            }
        }
    }

    Ok(data)
}

fn fallible_main() -> Result<(), ContextError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let arguments = CliArguments::parse();
    log::debug!("{:?}", arguments);

    let settings = match &arguments.configuration_path {
        Some(configuration_path) => Settings::from_path(configuration_path)?,
        None => Settings::default(),
    };
    let service = DocumentService::new(
        DirectoryStore::new(arguments.store_path.join("documents")),
        DirectoryStore::new(arguments.store_path.join("metadata")),
        &arguments.site_url,
        settings,
    );

    match arguments.command {
        Command::Create {
            method,
            input_path,
            name,
            qr_options_path,
        } => {
            let data = submission_data(&method, &input_path, qr_options_path.as_deref())?;
            let record = service.submit(&SubmissionRequest {
                method: Some(method),
                name,
                data: Some(data),
            })?;
            print_json(&record)?;
        }
        Command::List => print_json(&service.list()?)?,
        Command::Show { id } => match service.record(&id)? {
            Some(record) => print_json(&record)?,
            None => {
                return Err(ContextError::with_context(
                    ErrorKind::InvalidRequest,
                    format!("Document {} not found", id),
                ))
            }
        },
        Command::Serve {
            id,
            page,
            download,
            output_file_path,
        } => match service.serve(&id, page.as_deref(), download)? {
            ServeOutcome::Document(served) => {
                std::fs::write(&output_file_path, &served.bytes).map_err(|error| {
                    ContextError::with_error(
                        ErrorKind::Storage,
                        "Failed to write the output file",
                        &error,
                    )
                })?;
                log::info!(
                    "Saved {} ({}, {}) to the path: {:?}",
                    served.file_name,
                    served.content_type(),
                    served.content_disposition(),
                    output_file_path
                );
            }
            ServeOutcome::DocumentNotFound => {
                return Err(ContextError::with_context(
                    ErrorKind::InvalidRequest,
                    format!("Document {} not found", id),
                ))
            }
            ServeOutcome::PageNotFound => {
                return Err(ContextError::with_context(
                    ErrorKind::InvalidRequest,
                    "Page not found",
                ))
            }
        },
        Command::Delete { id } => service.delete(&id)?,
    }

    Ok(())
}
