//! Command execution.

use crate::Commands;
use colored::Colorize;
use lyskom_client::Session;
use lyskom_protocol::{MiscInfo, Time};
use serde::Serialize;

type CommandResult = Result<String, Box<dyn std::error::Error>>;

/// Executes a command and returns the formatted output.
pub async fn execute(session: &Session, cmd: Commands, json: bool) -> CommandResult {
    match cmd {
        Commands::Watch => {
            // Async messages are printed by the handlers registered at startup
            eprintln!("{}", "Press Ctrl+C to stop...".dimmed());
            tokio::signal::ctrl_c().await?;
            eprintln!("\n{}", "Stopping watch...".dimmed());
            Ok(String::new())
        }

        Commands::Time => {
            let time = session.get_time().await?;
            if json {
                return format_json(&time);
            }
            Ok(format_time(&time))
        }

        Commands::Version => {
            let info = session.version_info().await?;
            if json {
                return format_json(&info);
            }
            Ok(format!(
                "{} {} (protocol {})",
                info.server_software.to_latin1().cyan(),
                info.software_version.to_latin1(),
                info.protocol_version
            ))
        }

        Commands::Who {
            invisible,
            active_last,
        } => {
            let sessions = session.who_is_on(invisible, active_last).await?;
            if json {
                return format_json(&sessions);
            }
            let mut out = format!("{}", format!("{} sessions", sessions.len()).bold());
            for info in &sessions {
                let name = match session.uconference(info.person).await {
                    Ok(conf) => conf.name.to_latin1(),
                    Err(_) => format!("Person {}", info.person),
                };
                out.push_str(&format!(
                    "\n{:>6}  {}  {}",
                    info.session,
                    name.cyan(),
                    info.what_am_i_doing.to_latin1().dimmed()
                ));
            }
            Ok(out)
        }

        Commands::Lookup {
            name,
            persons,
            confs,
        } => {
            let (want_persons, want_confs) = match (persons, confs) {
                (false, false) => (true, true),
                flags => flags,
            };
            let matches = session.lookup_name(&name, want_persons, want_confs).await?;
            if json {
                return format_json(&matches);
            }
            if matches.is_empty() {
                return Ok(format!("{} matches {}", "Nothing".yellow(), name));
            }
            Ok(matches
                .iter()
                .map(|m| {
                    let kind = if m.conf_type.letterbox {
                        "person"
                    } else {
                        "conference"
                    };
                    format!("{:>6}  {} ({})", m.conf_no, m.name.to_latin1().cyan(), kind)
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }

        Commands::Conf { conf_no } => {
            let conf = session.conference(conf_no).await?;
            if json {
                return format_json(&conf);
            }
            Ok(format!(
                "{}\n  members: {}\n  texts: {}..{}\n  created: {}\n  last written: {}",
                format!("Conference {} {}", conf_no, conf.name.to_latin1().cyan()).bold(),
                conf.no_of_members,
                conf.first_local_no,
                conf.highest_local_no(),
                format_time(&conf.creation_time),
                format_time(&conf.last_written),
            ))
        }

        Commands::Text { text_no } => {
            let stat = session.text_stat(text_no).await?;
            let body = session.get_text(text_no).await?;
            if json {
                #[derive(Serialize)]
                struct TextView<'a> {
                    text_no: u32,
                    stat: &'a lyskom_protocol::TextStat,
                    body: String,
                }
                return format_json(&TextView {
                    text_no,
                    stat: &stat,
                    body: body.to_latin1(),
                });
            }

            let mut out = format!(
                "{}",
                format!("Text {} by person {}", text_no, stat.author).bold()
            );
            out.push_str(&format!("\n  written: {}", format_time(&stat.creation_time)));
            for item in &stat.misc_info {
                match item {
                    MiscInfo::Recpt(c) => out.push_str(&format!("\n  recipient: {}", c)),
                    MiscInfo::CcRecpt(c) => out.push_str(&format!("\n  cc: {}", c)),
                    MiscInfo::CommTo(t) => out.push_str(&format!("\n  comment to: {}", t)),
                    MiscInfo::FootnTo(t) => out.push_str(&format!("\n  footnote to: {}", t)),
                    _ => {}
                }
            }
            out.push_str("\n\n");
            out.push_str(&body.to_latin1());
            Ok(out)
        }

        Commands::Unread { conf } => {
            let confs = match conf {
                Some(conf) => vec![conf],
                None => session.unread_conferences().await?,
            };

            let mut results = Vec::new();
            for conf_no in confs {
                let membership = session.membership(conf_no).await?;
                let unread = session.resolve_unread(&membership).await?;
                if !unread.is_empty() {
                    results.push((conf_no, unread));
                }
            }

            if json {
                return format_json(&results);
            }
            if results.is_empty() {
                return Ok(format!("{}", "No unread texts".green()));
            }
            let mut lines = Vec::new();
            for (conf_no, unread) in &results {
                let name = session
                    .uconference(*conf_no)
                    .await
                    .map(|c| c.name.to_latin1())
                    .unwrap_or_else(|_| format!("Conference {}", conf_no));
                lines.push(format!(
                    "{:>6} unread in {}: {}",
                    unread.len(),
                    name.cyan(),
                    unread
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                ));
            }
            Ok(lines.join("\n"))
        }

        Commands::Send { recipient, message } => {
            session.send_message(recipient, &message).await?;
            Ok(format!("{} message to {}", "Sent".green(), recipient))
        }
    }
}

fn format_time(time: &Time) -> String {
    match time.to_naive() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "invalid time".to_string(),
    }
}

fn format_json<T: Serialize>(value: &T) -> CommandResult {
    Ok(serde_json::to_string_pretty(value)?)
}
