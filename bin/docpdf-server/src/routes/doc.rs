use crate::routes::{admin, convert, files, health, tasks};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "docpdf-server",
    description = "Office document to PDF conversion API"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(convert::ConvertApi::openapi());
    root.merge(tasks::TasksApi::openapi());
    root.merge(files::FilesApi::openapi());
    root.merge(admin::AdminApi::openapi());
    root
}
