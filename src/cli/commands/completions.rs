use crate::cli::Cli;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io::{self, Write};

const BIN_NAME: &str = "otc-auth";

pub fn execute(shell: Shell) {
    write_completions(shell, &mut io::stdout());
    eprintln!("\n# Installation:");
    eprintln!("#   {}", install_hint(shell));
}

fn write_completions<W: Write>(shell: Shell, out: &mut W) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN_NAME, out);
}

fn install_hint(shell: Shell) -> String {
    match shell {
        Shell::Bash => format!("eval \"$({} completions bash)\"   # in ~/.bashrc", BIN_NAME),
        Shell::Zsh => format!("eval \"$({} completions zsh)\"    # in ~/.zshrc", BIN_NAME),
        Shell::Fish => format!(
            "{0} completions fish > ~/.config/fish/completions/{0}.fish",
            BIN_NAME
        ),
        Shell::PowerShell => format!(
            "{} completions powershell | Out-String | Invoke-Expression",
            BIN_NAME
        ),
        Shell::Elvish => format!("eval ({} completions elvish | slurp)", BIN_NAME),
        _ => format!("see your shell's documentation for loading {} completions", BIN_NAME),
    }
}
