//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use zl_core::config::{save_config, ZliConfig};

use crate::output::{print_error, print_info, print_success, print_warning};

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Interpret a command-line value as the most specific TOML type
fn parse_value(value: &str) -> toml::Value {
    match value {
        "true" => toml::Value::Boolean(true),
        "false" => toml::Value::Boolean(false),
        _ => {
            if let Ok(i) = value.parse::<i64>() {
                toml::Value::Integer(i)
            } else if let Ok(f) = value.parse::<f64>() {
                toml::Value::Float(f)
            } else {
                toml::Value::String(value.to_string())
            }
        }
    }
}

/// Set `key` (dotted path) in `table`, creating intermediate tables
fn set_key(table: &mut toml::Table, key: &str, value: toml::Value) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        anyhow::bail!("Invalid key: {}", key);
    };
    if last.is_empty() {
        anyhow::bail!("Invalid key: {}", key);
    }

    let mut current = table;
    for part in parents {
        current = current
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Cannot navigate to key: {}", key))?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn get_key<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

/// Get a config value by key
pub fn config_get(path: &Path, key: &str) -> Result<u8> {
    if !path.exists() {
        print_error(&format!("Config file not found: {:?}", path));
        print_info("Run 'zli config init' to create one");
        return Ok(1);
    }

    let table = read_table(path)?;
    let Some(value) = get_key(&table, key) else {
        print_error(&format!("Key not found: {}", key));
        return Ok(1);
    };

    match value {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(value)?),
        other => println!("{}", other),
    }
    Ok(0)
}

/// Set a config value by key
///
/// The result must still parse as a zli configuration, otherwise nothing
/// is written.
pub fn config_set(path: &Path, key: &str, value: &str) -> Result<u8> {
    if !path.exists() {
        print_info("Creating default configuration...");
        config_init(path, false)?;
    }

    let mut table = read_table(path)?;
    set_key(&mut table, key, parse_value(value))?;

    let content = toml::to_string_pretty(&table)?;
    toml::from_str::<ZliConfig>(&content)
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Set {} = {}", key, value));
    Ok(0)
}

/// Show the configuration file
pub fn config_show(path: &Path) -> Result<u8> {
    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing defaults. Run 'zli config init' to write them out.");
        println!("{}", toml::to_string_pretty(&ZliConfig::default())?);
        return Ok(0);
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);
    Ok(0)
}

/// Write the default configuration
pub fn config_init(path: &Path, force: bool) -> Result<u8> {
    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(1);
    }

    save_config(path, &ZliConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_types() {
        assert_eq!(parse_value("true"), toml::Value::Boolean(true));
        assert_eq!(parse_value("42"), toml::Value::Integer(42));
        assert_eq!(parse_value("1.5"), toml::Value::Float(1.5));
        assert_eq!(
            parse_value("127.0.0.1:7714"),
            toml::Value::String("127.0.0.1:7714".into())
        );
    }

    #[test]
    fn test_set_and_get_nested_key() {
        let mut table = toml::Table::new();
        set_key(&mut table, "session.batch.max_delay", toml::Value::Integer(50)).unwrap();
        assert_eq!(
            get_key(&table, "session.batch.max_delay"),
            Some(&toml::Value::Integer(50))
        );
        assert!(get_key(&table, "session.missing").is_none());
        assert!(set_key(&mut table, "session.", toml::Value::Integer(1)).is_err());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut table = toml::Table::new();
        table.insert("daemon".into(), toml::Value::Integer(1));
        assert!(set_key(&mut table, "daemon.port_wait", toml::Value::Integer(5)).is_err());
    }
}
