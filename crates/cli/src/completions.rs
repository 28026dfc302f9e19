use crate::args::Cli;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io;

pub fn generate(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "quiesce", &mut io::stdout());
}
