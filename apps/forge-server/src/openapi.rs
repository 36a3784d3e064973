use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "orange-forge coordinator",
        description = "Signed task-dispatch surface for named worker agents"
    ),
    paths(
        crate::api_meta::healthz,
        crate::api_meta::about,
        crate::api_register::register,
        crate::api_ping::ping,
        crate::api_tasks::get_task,
        crate::api_tasks::report_task,
    ),
    tags(
        (name = "Forge", description = "HMAC-signed agent protocol"),
        (name = "Meta", description = "Service metadata")
    )
)]
pub(crate) struct ApiDoc;

pub(crate) fn document() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_protocol_paths() {
        let doc = document();
        for path in [
            "/orange-forge/api/register",
            "/orange-forge/api/ping",
            "/orange-forge/api/getTask",
            "/orange-forge/api/reportTask",
            "/healthz",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
