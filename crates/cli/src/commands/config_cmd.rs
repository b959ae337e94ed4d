//! `orgchat config` — Configuration management commands.

use orgchat_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");
            if !config.has_api_key() {
                println!("   warning: no API key set (ORGCHAT_API_KEY or OPENAI_API_KEY)");
            }
            if config.auth.mode == orgchat_config::AuthMode::Tokens && config.auth.tokens.is_empty()
            {
                println!("   warning: no access tokens configured under [auth.tokens]");
            }

            let (default_budget, pinned_budget) = config.context.budgets();
            println!();
            println!("   Provider:  {}", config.provider.name);
            println!("   Model:     {}", config.chat.default_model);
            println!("   Budgets:   {default_budget} / {pinned_budget} (pinned)");
            println!(
                "   Retrieval: {}",
                if config.retrieval.enabled { "on" } else { "off" }
            );
            println!("   Store:     {:?}", config.store.backend);
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{config:#?}");
    Ok(())
}

pub fn default() {
    println!("{}", AppConfig::default_toml());
}

pub fn path() {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = orgchat_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().ends_with(".orgchat/config.toml"));
    }

    #[test]
    fn default_toml_parses_back() {
        let text = orgchat_config::AppConfig::default_toml();
        let config = load_text(&text);
        assert_eq!(config.context.budgets(), (2000, 1000));
    }

    fn load_text(text: &str) -> orgchat_config::AppConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        orgchat_config::AppConfig::load_from(&path).unwrap()
    }
}
