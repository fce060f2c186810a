pub mod client;
pub mod events;
pub mod logs;
pub mod namespace;

pub use client::*;
pub use events::*;
pub use logs::*;
pub use namespace::*;

use k0rdent_core::Error;

/// Translate a Kubernetes API error into the server taxonomy. Status codes
/// carry the intent; everything else from the client is a transport problem.
pub fn map_kube_error(err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) => match resp.code {
            400 => Error::InvalidParams(resp.message),
            401 => Error::Unauthorized(resp.message),
            403 => Error::Forbidden(resp.message),
            404 => Error::NotFound(resp.message),
            409 => Error::Conflict(resp.message),
            _ => Error::Internal(format!("kubernetes api error ({}): {}", resp.code, resp.message)),
        },
        other => Error::Unavailable(format!("kubernetes api unreachable: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(map_kube_error(api_error(404, "gone")).code(), "notFound");
        assert_eq!(map_kube_error(api_error(403, "nope")).code(), "forbidden");
        assert_eq!(map_kube_error(api_error(409, "busy")).code(), "conflict");
        assert_eq!(map_kube_error(api_error(401, "who")).code(), "unauthorized");
        assert_eq!(map_kube_error(api_error(400, "bad")).code(), "invalidParams");
        assert_eq!(map_kube_error(api_error(500, "boom")).code(), "internal");
    }
}
