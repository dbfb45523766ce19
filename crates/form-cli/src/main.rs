mod wizard;

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use form_spec::{
    ConfigIssue, Control, FieldInput, FieldType, Form, FormConfiguration, HttpOptionSource,
    HttpSourceConfig, RegistryOptions, RendererRegistry, StaticOfferedCountries,
    ValueMap, render_json_ui, render_text, submit_values,
};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wizard::{
    AnswerParseError, PromptContext, Verbosity, WizardPresenter, control_options, is_multi_valued,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const API_BASE_URL_ENV: &str = "FORMKIT_API_BASE_URL";
const IMAGE_BASE_URL_ENV: &str = "FORMKIT_IMAGE_BASE_URL";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Schema-driven form helper",
    long_about = "Lints, renders, validates and interactively fills form configurations"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

/// Where relation options and image previews come from.
#[derive(clap::Args, Clone, Debug, Default)]
struct SourceArgs {
    /// Base URL joined with relative relation endpoints (defaults to FORMKIT_API_BASE_URL).
    #[arg(long, value_name = "URL")]
    api_base_url: Option<String>,
    /// Base URL for image previews (defaults to FORMKIT_IMAGE_BASE_URL).
    #[arg(long, value_name = "URL")]
    image_base_url: Option<String>,
    /// Comma separated ISO codes offered by `preferred_country` fields.
    #[arg(long, value_delimiter = ',', value_name = "CODES")]
    offered_countries: Vec<String>,
    /// Give up on a relation fetch after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Lint a form configuration.
    Check {
        /// Path to the form configuration JSON.
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,
    },
    /// Print the JSON Schema of the configuration format.
    Schema {
        /// Write the schema to this file instead of stdout.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Render the visible fields of a form.
    Render {
        /// Path to the form configuration JSON.
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,
        /// Optional JSON file with current values.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Run the two-phase submit validation over a values file.
    Validate {
        /// Path to the form configuration JSON.
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,
        /// Path to the values JSON file.
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
    },
    /// Fill a form field by field in a text shell.
    Fill {
        /// Path to the form configuration JSON.
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,
        /// Optional JSON file with initial values (edit mode).
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        /// Show verbose output (visible fields, choices).
        #[arg(long, alias = "debug")]
        verbose: bool,
        /// Also emit the submitted values as JSON.
        #[arg(long)]
        values_json: bool,
        #[command(flatten)]
        sources: SourceArgs,
    },
}

fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Check { config } => run_check(config),
        Command::Schema { out } => run_schema(out),
        Command::Render {
            config,
            values,
            format,
            sources,
        } => run_render(config, values, format, sources),
        Command::Validate { config, values } => run_validate(config, values),
        Command::Fill {
            config,
            values,
            verbose,
            values_json,
            sources,
        } => run_fill(config, values, verbose, values_json, sources),
    }
}

/// Diagnostics go to stderr so stdout stays machine readable.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn load_configuration(path: &Path) -> CliResult<FormConfiguration> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn load_values(path: Option<&Path>) -> CliResult<ValueMap> {
    let Some(path) = path else {
        return Ok(ValueMap::new());
    };
    let contents = fs::read_to_string(path)?;
    match serde_json::from_str(&contents)? {
        Value::Object(map) => Ok(map),
        _ => Err(format!("values file {} must hold a JSON object", path.display()).into()),
    }
}

/// Flag value, falling back to the environment.
fn flag_or_env(flag: Option<String>, key: &str) -> Option<String> {
    flag.or_else(|| env::var_os(key).and_then(|value| value.into_string().ok()))
        .filter(|value| !value.trim().is_empty())
}

fn run_check(config_path: PathBuf) -> CliResult<()> {
    let config = load_configuration(&config_path)?;
    let issues = config.check();
    if issues.is_empty() {
        println!("Configuration OK: {} field(s)", config.fields.len());
        return Ok(());
    }
    describe_issues(&issues);
    if issues.iter().any(ConfigIssue::is_error) {
        Err("configuration has errors".into())
    } else {
        Ok(())
    }
}

fn describe_issues(issues: &[ConfigIssue]) {
    println!("Issues:");
    for issue in issues {
        println!("  {}", issue);
    }
}

fn run_schema(out: Option<PathBuf>) -> CliResult<()> {
    let schema = serde_json::to_string_pretty(&FormConfiguration::json_schema())?;
    match out {
        Some(path) => {
            fs::write(&path, schema)?;
            println!("Wrote schema to {}", path.display());
        }
        None => println!("{}", schema),
    }
    Ok(())
}

/// Mounts the form and resolves relation options that are pending.
fn mount_form(
    config: FormConfiguration,
    values: &ValueMap,
    sources: &SourceArgs,
) -> CliResult<(Form, HttpOptionSource)> {
    let offered = if sources.offered_countries.is_empty() {
        None
    } else {
        Some(StaticOfferedCountries::from_codes(&sources.offered_countries).shared())
    };
    let registry = RendererRegistry::with_defaults(RegistryOptions {
        offered_countries: offered,
        image_base_url: flag_or_env(sources.image_base_url.clone(), IMAGE_BASE_URL_ENV),
    });
    let source = HttpOptionSource::new(HttpSourceConfig {
        base_url: flag_or_env(sources.api_base_url.clone(), API_BASE_URL_ENV),
        timeout: sources.timeout_secs.map(Duration::from_secs),
        ..Default::default()
    })?;

    let mut form = Form::with_initial_values(config, values).with_registry(registry);
    load_pending(&mut form, &source)?;
    Ok((form, source))
}

fn load_pending(form: &mut Form, source: &HttpOptionSource) -> CliResult<()> {
    let pending = form.pending_fetches();
    if pending.is_empty() {
        return Ok(());
    }
    debug!(count = pending.len(), "resolving relation options");
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(form.load_relations(source));
    Ok(())
}

fn run_render(
    config_path: PathBuf,
    values_path: Option<PathBuf>,
    format: RenderMode,
    sources: SourceArgs,
) -> CliResult<()> {
    let config = load_configuration(&config_path)?;
    let values = load_values(values_path.as_deref())?;
    let (form, _) = mount_form(config, &values, &sources)?;
    let rendered = form.render()?;
    match format {
        RenderMode::Text => println!("{}", render_text(&rendered)),
        RenderMode::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json_ui(&rendered))?
        ),
    }
    Ok(())
}

fn run_validate(config_path: PathBuf, values_path: PathBuf) -> CliResult<()> {
    let config = load_configuration(&config_path)?;
    let values = load_values(Some(values_path.as_path()))?;

    match submit_values(config, &values) {
        Ok(coerced) => {
            println!("Validation result: valid");
            println!("{}", serde_json::to_string_pretty(&coerced)?);
            Ok(())
        }
        Err(err) => {
            println!("Validation result: invalid ({})", err.phase());
            println!("Errors:");
            for (field, message) in err.errors().iter() {
                println!("  {} - {}", field, message);
            }
            Err("validation failed".into())
        }
    }
}

fn run_fill(
    config_path: PathBuf,
    values_path: Option<PathBuf>,
    verbose: bool,
    values_json: bool,
    sources: SourceArgs,
) -> CliResult<()> {
    let config = load_configuration(&config_path)?;
    let values = load_values(values_path.as_deref())?;
    let (mut form, source) = mount_form(config, &values, &sources)?;
    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose), values_json);
    let mut answered: BTreeSet<String> = BTreeSet::new();

    loop {
        let rendered = form.render()?;
        presenter.show_header(&rendered);
        if rendered.disabled {
            return Err("form is read-only".into());
        }

        let askable: Vec<&Control> = rendered
            .controls
            .iter()
            .filter(|control| !control.disabled)
            .collect();
        let next = askable
            .iter()
            .position(|control| !answered.contains(&control.name));

        let Some(index) = next else {
            match form.submit(|values| values) {
                Ok(values) => {
                    info!("form submitted");
                    presenter.show_completion(&values);
                    return Ok(());
                }
                Err(err) => {
                    presenter.show_field_errors(err.errors());
                    let mut retry = false;
                    for (field, _) in err.errors().iter() {
                        if askable.iter().any(|control| control.name == field) {
                            answered.remove(field);
                            retry = true;
                        }
                    }
                    if !retry {
                        return Err("remaining errors are on fields that cannot be edited".into());
                    }
                    continue;
                }
            }
        };

        let control = askable[index];
        presenter.show_status(&rendered);
        let prompt = PromptContext::new(control, index + 1, askable.len());
        let input = prompt_field(&prompt, control, &presenter)?;
        answered.insert(control.name.clone());
        if let Some(input) = input {
            if let Err(err) = form.input(&control.name, input) {
                presenter.show_input_error(&err);
                answered.remove(&control.name);
                continue;
            }
            load_pending(&mut form, &source)?;
        }
        presenter.show_notifications(&form.attempt_submission());
    }
}

fn prompt_field(
    prompt: &PromptContext,
    control: &Control,
    presenter: &WizardPresenter,
) -> CliResult<Option<FieldInput>> {
    loop {
        presenter.show_prompt(prompt);
        print!("> ");
        io::stdout().flush()?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Err("input ended before the form was complete".into());
        }

        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("exit") {
            return Err("fill aborted by user".into());
        }

        match parse_answer(control, trimmed) {
            Ok(value) => return Ok(value),
            Err(err) => presenter.show_parse_error(&err),
        }
    }
}

/// Turns one typed line into the edit for `control`. Blank answers leave the
/// field untouched.
fn parse_answer(control: &Control, raw: &str) -> Result<Option<FieldInput>, AnswerParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        if control.required {
            return Err(AnswerParseError::new("This field requires an answer.", None));
        }
        return Ok(None);
    }

    let input = match control.kind {
        FieldType::Number => parse_number(raw)?,
        FieldType::Date => FieldInput::Date(Some(raw.to_string())),
        FieldType::Phone => FieldInput::Phone(raw.to_string()),
        FieldType::Image => FieldInput::File(Some(raw.to_string())),
        FieldType::Country | FieldType::PreferredCountry => {
            FieldInput::Select(match_option(control, raw)?)
        }
        FieldType::MultiCheckbox => parse_selection(control, raw)?,
        FieldType::Relation if is_multi_valued(control) => parse_selection(control, raw)?,
        FieldType::Select | FieldType::Radio | FieldType::Relation => {
            FieldInput::Select(match_option(control, raw)?)
        }
        FieldType::Text | FieldType::Textarea | FieldType::Email | FieldType::Url => {
            FieldInput::Text(raw.to_string())
        }
    };
    Ok(Some(input))
}

fn parse_number(raw: &str) -> Result<FieldInput, AnswerParseError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(FieldInput::Text(raw.to_string())),
        _ => Err(AnswerParseError::new(
            "Please enter a number.",
            Some("expected number".to_string()),
        )),
    }
}

/// Accepts an option value or label, case-insensitively.
fn match_option(control: &Control, raw: &str) -> Result<String, AnswerParseError> {
    let options = control_options(control);
    if options.is_empty() {
        return Ok(raw.to_string());
    }
    options
        .iter()
        .find(|option| {
            option.value.eq_ignore_ascii_case(raw) || option.label.eq_ignore_ascii_case(raw)
        })
        .map(|option| option.value.clone())
        .ok_or_else(|| {
            AnswerParseError::new(
                format!("'{}' is not one of the options.", raw),
                Some(
                    options
                        .iter()
                        .take(12)
                        .map(|option| option.value.as_str())
                        .collect::<Vec<_>>()
                        .join("/"),
                ),
            )
        })
}

fn parse_selection(control: &Control, raw: &str) -> Result<FieldInput, AnswerParseError> {
    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match_option(control, part).map(Value::String))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FieldInput::Value(Value::Array(values)))
}
