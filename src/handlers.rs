//! HTTP surface: health, the four conversion routes, and streaming of result
//! artifacts.

use crate::artifact::Artifact;
use crate::auth::ApiKey;
use crate::config::AppConfig;
use crate::converter::ConversionService;
use crate::types::*;
use actix_multipart::form::{bytes::Bytes as FilePart, MultipartForm, MultipartFormConfig};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream};
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;
const IMAGES_PDF_NAME: &str = "converted_images.pdf";

#[derive(MultipartForm)]
pub struct FileForm {
    file: FilePart,
}

#[derive(MultipartForm)]
pub struct FilesForm {
    files: Vec<FilePart>,
}

impl From<FilePart> for Upload {
    fn from(part: FilePart) -> Self {
        Upload {
            file_name: part.file_name,
            content_type: part.content_type.map(|mime| mime.essence_str().to_string()),
            data: part.data,
        }
    }
}

/// Registers app data and routes. Used by `main` and by integration tests.
pub fn configure(
    config: web::Data<AppConfig>,
    service: web::Data<ConversionService>,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let limit = config.max_upload_bytes;
        let multipart = MultipartFormConfig::default()
            .total_limit(limit)
            .memory_limit(limit)
            .error_handler(|err, _req| {
                log::warn!("Rejected multipart body: {}", err);
                ConversionError::invalid_file(err.to_string()).into()
            });

        cfg.app_data(config.clone())
            .app_data(service)
            .app_data(multipart)
            .route("/", web::get().to(health))
            .route("/health", web::get().to(health))
            .service(
                web::scope(&config.conversion_scope())
                    .route("/pdf-to-word", web::post().to(pdf_to_word))
                    .route("/word-to-pdf", web::post().to(word_to_pdf))
                    .route("/images-to-pdf", web::post().to(images_to_pdf))
                    .route("/pdf-to-images", web::post().to(pdf_to_images)),
            );
    }
}

pub async fn health(config: web::Data<AppConfig>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        message: format!("Welcome to {} v{}", config.app_title, config.app_version),
        service: config.app_title.clone(),
        version: config.app_version.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn pdf_to_word(
    _key: ApiKey,
    service: web::Data<ConversionService>,
    form: MultipartForm<FileForm>,
) -> Result<HttpResponse, ConversionError> {
    log::info!("📄 pdf-to-word request received");
    let upload = Upload::from(form.into_inner().file);
    let filename = format!("{}.docx", upload.stem());

    let artifact = service.pdf_to_docx(upload).await.map_err(log_failure)?;
    stream_artifact(artifact, DOCX_MIME, filename).await
}

async fn word_to_pdf(
    _key: ApiKey,
    service: web::Data<ConversionService>,
    form: MultipartForm<FileForm>,
) -> Result<HttpResponse, ConversionError> {
    log::info!("📄 word-to-pdf request received");
    let upload = Upload::from(form.into_inner().file);
    let filename = format!("{}.pdf", upload.stem());

    let artifact = service.docx_to_pdf(upload).await.map_err(log_failure)?;
    stream_artifact(artifact, PDF_MIME, filename).await
}

async fn images_to_pdf(
    _key: ApiKey,
    service: web::Data<ConversionService>,
    form: MultipartForm<FilesForm>,
) -> Result<HttpResponse, ConversionError> {
    let uploads: Vec<Upload> = form.into_inner().files.into_iter().map(Upload::from).collect();
    log::info!("🖼️ images-to-pdf request received: {} files", uploads.len());

    let artifact = service.images_to_pdf(uploads).await.map_err(log_failure)?;
    stream_artifact(artifact, PDF_MIME, IMAGES_PDF_NAME.to_string()).await
}

async fn pdf_to_images(
    _key: ApiKey,
    service: web::Data<ConversionService>,
    form: MultipartForm<FileForm>,
) -> Result<HttpResponse, ConversionError> {
    log::info!("🖼️ pdf-to-images request received");
    let upload = Upload::from(form.into_inner().file);
    let filename = format!("{}.zip", upload.stem());

    let artifact = service.pdf_to_images(upload).await.map_err(log_failure)?;
    stream_artifact(artifact, ZIP_MIME, filename).await
}

fn log_failure(err: ConversionError) -> ConversionError {
    match &err {
        ConversionError::InvalidFile { .. } => log::warn!("❌ {}", err),
        _ => log::error!("❌ {}", err),
    }
    err
}

/// Streams a result artifact as an attachment. The body owns the artifact:
/// the file is deleted when the body is dropped, whether it was fully sent or
/// the client went away.
async fn stream_artifact(
    artifact: Artifact,
    content_type: &'static str,
    filename: String,
) -> Result<HttpResponse, ConversionError> {
    let file = tokio::fs::File::open(artifact.path()).await?;
    let size = file.metadata().await?.len();
    log::info!("✅ Sending {} ({} bytes)", filename, size);

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .no_chunking(size)
        .streaming(artifact_body(file, artifact)))
}

fn artifact_body(
    file: tokio::fs::File,
    artifact: Artifact,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    stream::unfold(Some((file, artifact)), |state| async move {
        let (mut file, artifact) = state?;
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        match file.read_buf(&mut buf).await {
            Ok(0) => {
                drop(file);
                drop(artifact);
                None
            }
            Ok(_) => Some((Ok(buf.freeze()), Some((file, artifact)))),
            // Stop after the error; file and artifact drop here.
            Err(e) => Some((Err(e), None)),
        }
    })
}
