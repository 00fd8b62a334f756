//! # Config Initialization / 配置初始化
//!
//! Creates a starter `gluatest.toml` in the current directory, either
//! with defaults (`--non-interactive`) or through a couple of prompts.
//!
//! 在当前目录创建初始 `gluatest.toml`，可使用默认值
//! （`--non-interactive`），也可通过若干提示完成。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::fs;
use std::path::Path;

use crate::core::config::starter_config_toml;

/// Generates a `gluatest.toml` for the current project, confirming
/// before overwriting an existing one.
pub fn run_init_wizard(non_interactive: bool) -> Result<()> {
    let config_path = Path::new("gluatest.toml");
    let theme = ColorfulTheme::default();

    if config_path.exists() && !non_interactive {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(format!(
                "{} already exists. Overwrite it?",
                config_path.display()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmation {
            println!("Aborted; existing configuration left untouched.");
            return Ok(());
        }
    }

    let (gamemode, project_dir) = if non_interactive {
        ("sandbox".to_string(), ".".to_string())
    } else {
        println!(
            "\n{}",
            "Let's set up GLuaTest for this project.".cyan().bold()
        );

        let gamemode: String = Input::with_theme(&theme)
            .with_prompt("Gamemode the test server should boot into")
            .default("sandbox".to_string())
            .interact_text()
            .context("Failed to read gamemode")?;

        let project_dir: String = Input::with_theme(&theme)
            .with_prompt("Addon project directory")
            .default(".".to_string())
            .interact_text()
            .context("Failed to read project directory")?;

        (gamemode, project_dir)
    };

    write_config(config_path, &gamemode, &project_dir)
}

fn write_config(config_path: &Path, gamemode: &str, project_dir: &str) -> Result<()> {
    fs::write(config_path, starter_config_toml(gamemode, project_dir))
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!(
        "{} {}",
        "Wrote".green(),
        config_path.display().to_string().green().bold()
    );
    println!("Run your tests with: {}", "gluatest-runner run".bold());
    Ok(())
}
