//! Command lines run inside the context.

use harbor_sandbox::Command;

use crate::credentials::Credentials;
use crate::options::{ConnectOptions, SessionOptions};

/// Global npm install of the CLI package.
pub(crate) fn install_command(options: &ConnectOptions) -> Command {
    Command::new("npm", ["install", "-g", options.cli_package.as_str()])
}

/// Non-interactive, streaming-JSON invocation with the prompt last.
pub(crate) fn cli_command(
    connect: &ConnectOptions,
    session: &SessionOptions,
    credentials: &Credentials,
    prompt: &str,
) -> Command {
    let mut args: Vec<String> = [
        "-p",
        "--output-format",
        "stream-json",
        "--verbose",
        "--dangerously-skip-permissions",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();
    if let Some(model) = &session.model {
        args.push("--model".into());
        args.push(model.clone());
    }
    args.extend(session.extra_args.iter().cloned());
    args.push(prompt.to_owned());

    let mut command = Command::new(connect.cli_binary.as_str(), args).cwd(connect.working_directory.as_str());
    for (key, value) in credentials.env() {
        command = command.env(key, value);
    }
    command
}
