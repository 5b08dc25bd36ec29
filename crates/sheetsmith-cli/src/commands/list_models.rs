//! The `sheetsmith list-models` command.

use anyhow::Result;

use sheetsmith_core::traits::ModelInfo;
use sheetsmith_providers::config::load_config_from;
use sheetsmith_providers::ollama::OllamaProvider;
use sheetsmith_providers::{create_provider, ProviderConfig};

use super::Target;

pub async fn execute(target: &Target) -> Result<()> {
    let config = load_config_from(target.config.as_deref())?;

    let mut names: Vec<_> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if target.provider.as_deref().is_some_and(|filter| filter != name.as_str()) {
            continue;
        }
        let provider_config = &config.providers[name];

        let models = match provider_config {
            // Installed models are only known to the running server
            ProviderConfig::Ollama { base_url } => {
                let ollama = OllamaProvider::new(base_url, config.timeout_secs)?;
                match ollama.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        eprintln!("Warning: {name}: {e}");
                        continue;
                    }
                }
            }
            _ => create_provider(name, provider_config, config.timeout_secs)?.available_models(),
        };

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                print_model(model);
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `sheetsmith init` to create a config file.");
    }

    Ok(())
}

fn print_model(model: &ModelInfo) {
    let vision = if model.vision { "vision" } else { "text only" };
    if model.max_context > 0 {
        println!(
            "  {} — {} ({}K context, {vision}, ${:.4}/{:.4} per 1K tokens)",
            model.id,
            model.name,
            model.max_context / 1000,
            model.cost_per_1k_input,
            model.cost_per_1k_output,
        );
    } else {
        println!("  {} — {} ({vision})", model.id, model.name);
    }
}
