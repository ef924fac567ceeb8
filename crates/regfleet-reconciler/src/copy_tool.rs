//! Argument lists for the external image copy tool.
//!
//! Only the command line is built here. Running it happens inside the
//! scheduled job generated by [`crate::jobs`].

use regfleet_core::Credentials;

use crate::error::{ReconcileError, Result};

/// Executable name of the copy tool.
pub const COPY_TOOL: &str = "skopeo";

/// Container image shipping the copy tool.
pub const DEFAULT_IMAGE: &str = "quay.io/skopeo/stable";

/// Environment variable holding the space-separated source repositories.
pub const REPOSITORIES_VAR: &str = "REPOSITORIES";

const SYNC: &str = "sync";
const SOURCE_TRANSPORT: &str = "--src";
const DESTINATION_TRANSPORT: &str = "--dest";
const DOCKER_TRANSPORT: &str = "docker";
const DIRECTORY_TRANSPORT: &str = "dir";
const SCOPED: &str = "--scoped";
const SOURCE_CREDENTIALS: &str = "--src-creds";
const DESTINATION_CREDENTIALS: &str = "--dest-creds";

fn creds(credentials: &Credentials) -> String {
    format!("{}:{}", credentials.username, credentials.password)
}

/// Registry to registry copy.
pub fn sync_args(
    source: &str,
    source_credentials: &Credentials,
    destination: &str,
    destination_credentials: &Credentials,
) -> Vec<String> {
    [
        SYNC,
        SOURCE_TRANSPORT,
        DOCKER_TRANSPORT,
        DESTINATION_TRANSPORT,
        DOCKER_TRANSPORT,
        SOURCE_CREDENTIALS,
    ]
    .into_iter()
    .map(str::to_string)
    .chain([
        creds(source_credentials),
        DESTINATION_CREDENTIALS.to_string(),
        creds(destination_credentials),
        source.to_string(),
        destination.to_string(),
    ])
    .collect()
}

/// Registry to local directory copy, keeping the registry path below `directory`.
pub fn export_args(source: &str, credentials: &Credentials, directory: &str) -> Vec<String> {
    [
        SYNC,
        SOURCE_TRANSPORT,
        DOCKER_TRANSPORT,
        DESTINATION_TRANSPORT,
        DIRECTORY_TRANSPORT,
        SCOPED,
        SOURCE_CREDENTIALS,
    ]
    .into_iter()
    .map(str::to_string)
    .chain([creds(credentials), source.to_string(), directory.to_string()])
    .collect()
}

/// Local directory to registry copy.
pub fn import_args(directory: &str, destination: &str, credentials: &Credentials) -> Vec<String> {
    [
        SYNC,
        SOURCE_TRANSPORT,
        DIRECTORY_TRANSPORT,
        DESTINATION_TRANSPORT,
        DOCKER_TRANSPORT,
        DESTINATION_CREDENTIALS,
    ]
    .into_iter()
    .map(str::to_string)
    .chain([
        creds(credentials),
        directory.to_string(),
        destination.to_string(),
    ])
    .collect()
}

/// Loop variable holding the current repository inside [`sync_script`].
const REPO_PLACEHOLDER: &str = "$repo";

/// Bash script syncing every repository listed in [`REPOSITORIES_VAR`] into
/// `destination`.
///
/// Every argument is shell-quoted, so credentials and hosts reach the copy
/// tool as single literal words.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidConfig`] if an argument cannot be quoted
/// (it contains a NUL byte).
pub fn sync_script(
    source_credentials: &Credentials,
    destination: &str,
    destination_credentials: &Credentials,
) -> Result<String> {
    let mut words = vec![COPY_TOOL.to_string()];
    for arg in sync_args(
        REPO_PLACEHOLDER,
        source_credentials,
        destination,
        destination_credentials,
    ) {
        if arg == REPO_PLACEHOLDER {
            words.push(format!("\"{REPO_PLACEHOLDER}\""));
            continue;
        }
        let quoted = shlex::try_quote(&arg).map_err(|e| {
            ReconcileError::invalid_config(format!("cannot quote copy-tool argument: {e}"))
        })?;
        words.push(quoted.into_owned());
    }
    Ok(format!(
        "repoArray=(${{{REPOSITORIES_VAR}}})\nfor repo in \"${{repoArray[@]}}\"\ndo\n\t{}\ndone",
        words.join(" ")
    ))
}
