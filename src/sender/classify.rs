/// Client-error messages the backend emits for transient
/// authentication/permission states. These reject the request today but are
/// expected to clear up, so the chunk is failed back to the caller for
/// retry instead of being dropped.
const RETRIABLE_CLIENT_ERRORS: [&str; 5] = [
    "Invalid Credentials",
    "Request had invalid credentials.",
    "The caller does not have permission",
    "Project has not enabled the API. Please use Google Developers Console to activate the API for your project.",
    "Unable to fetch access token (no scopes configured?)",
];

/// Exact-match test against the known transient phrases, independent of the
/// transport-layer error representation.
pub fn is_retriable_client_error(message: &str) -> bool {
    RETRIABLE_CLIENT_ERRORS.contains(&message)
}
