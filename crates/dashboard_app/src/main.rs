use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dashboard_app::{DashboardConfig, Session};
use dashboard_core::{AppViewModel, ArtifactView, MessageId, Msg, RequestStatus, Role, SlotId};
use dashboard_logging::dash_info;

const WAIT: Duration = Duration::from_secs(600);
const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "dashboard", version, about = "Traffic and driver safety dashboard client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an image or video through one of the prediction models.
    Analyze(AnalyzeArgs),
    /// Forecast traffic volume at a station.
    Traffic {
        #[arg(long)]
        station: String,
        /// `YYYY-MM-DD HH:MM[:SS]`
        #[arg(long)]
        datetime: String,
    },
    /// Ask the station assistant a question.
    Chat {
        #[arg(long)]
        station: String,
        message: String,
    },
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long, value_enum)]
    slot: SlotArg,
    #[arg(long, conflicts_with = "sample", required_unless_present = "sample")]
    file: Option<PathBuf>,
    /// Locator of a bundled sample, e.g. `/drowsiness/drowsiness1.jpg`.
    #[arg(long)]
    sample: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SlotArg {
    AccidentImage,
    AccidentVideo,
    Drowsiness,
}

impl From<SlotArg> for SlotId {
    fn from(arg: SlotArg) -> Self {
        match arg {
            SlotArg::AccidentImage => SlotId::AccidentImage,
            SlotArg::AccidentVideo => SlotId::AccidentVideo,
            SlotArg::Drowsiness => SlotId::Drowsiness,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DashboardConfig::from_env()?;
    dashboard_logging::initialize(config.log_destination, config.log_level);
    dash_info!("Dashboard client using API at {}", config.api_url);

    let mut session = Session::start(&config)?;
    match cli.command {
        Command::Analyze(args) => analyze(&mut session, args),
        Command::Traffic { station, datetime } => traffic(&mut session, station, datetime),
        Command::Chat { station, message } => chat(&mut session, station, message),
    }
}

fn analyze(session: &mut Session, args: AnalyzeArgs) -> Result<()> {
    let slot = SlotId::from(args.slot);
    match (args.file, args.sample) {
        (Some(path), _) => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            session.dispatch(Msg::FileSelected {
                slot,
                file_name,
                declared_type: None,
                bytes,
            });
        }
        (None, Some(locator)) => {
            session.dispatch(Msg::SampleSelected { slot, locator });
        }
        (None, None) => bail!("either --file or --sample is required"),
    }
    if let Some(notice) = slot_notice(&session.view(), slot) {
        bail!(notice);
    }

    session.dispatch(Msg::SubmitClicked { slot });
    if !session.wait_until_idle(WAIT) {
        bail!("timed out waiting for the prediction");
    }
    print_slot(&session.view(), slot);
    Ok(())
}

fn traffic(session: &mut Session, station: String, datetime: String) -> Result<()> {
    session.dispatch(Msg::TrafficStationChanged(station));
    session.dispatch(Msg::TrafficDateTimeChanged(datetime));
    session.dispatch(Msg::TrafficSubmitted);
    if let Some(notice) = session.view().traffic.notice {
        bail!(notice);
    }
    if !session.wait_until_idle(WAIT) {
        bail!("timed out waiting for the forecast");
    }
    let view = session.view().traffic;
    match (view.prediction, view.error) {
        (Some(prediction), _) => println!("{prediction}"),
        (None, Some(error)) => bail!(error),
        (None, None) => println!("No forecast."),
    }
    Ok(())
}

fn chat(session: &mut Session, station: String, message: String) -> Result<()> {
    session.dispatch(Msg::ChatStationSelected(station));
    session.dispatch(Msg::ChatInputChanged(message));
    session.dispatch(Msg::ChatSubmitted);
    if session.is_idle() {
        bail!("nothing to send: the message is empty");
    }

    let mut stdout = io::stdout();
    let mut printed: Option<(MessageId, usize)> = None;
    while !session.is_idle() {
        if session.wait_for_event(POLL).is_none() {
            continue;
        }
        let view = session.view();
        let Some(reply) = view.chat.messages.last().filter(|m| m.role == Role::Assistant) else {
            continue;
        };
        // Chunks only ever extend the reply they belong to.
        let offset = match printed {
            Some((id, len)) if id == reply.id => len,
            Some(_) => {
                writeln!(stdout)?;
                0
            }
            None => 0,
        };
        if let Some(fresh) = reply.content.get(offset..) {
            write!(stdout, "{fresh}")?;
            stdout.flush()?;
            printed = Some((reply.id, reply.content.len()));
        }
    }
    writeln!(stdout)?;
    Ok(())
}

fn slot_notice(view: &AppViewModel, slot: SlotId) -> Option<String> {
    view.slot(slot).and_then(|slot| slot.notice.clone())
}

fn print_slot(view: &AppViewModel, slot: SlotId) {
    let Some(slot) = view.slot(slot) else {
        return;
    };
    if let Some(label) = slot.input_label.as_deref() {
        println!("Input: {label}");
    }
    match slot.status {
        RequestStatus::Succeeded => {
            if let Some(message) = &slot.message {
                println!("{message}");
            }
            if let Some(label) = &slot.prediction_label {
                println!("Prediction: {label}");
            }
            for line in slot.probability_lines.iter().chain(&slot.detail_lines) {
                println!("  {line}");
            }
            match &slot.artifact {
                ArtifactView::Ready { url } => println!("Frame: {url}"),
                ArtifactView::Failed { error } => println!("Frame unavailable: {error}"),
                ArtifactView::Hidden | ArtifactView::Loading => {}
            }
        }
        RequestStatus::Failed => {
            println!("Error: {}", slot.error.as_deref().unwrap_or("unknown"));
        }
        RequestStatus::Idle | RequestStatus::Submitting => println!("No result."),
    }
}
