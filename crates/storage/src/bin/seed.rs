//! Seeds a demo database: a small question bank across all four sections
//! plus a couple of user rows, enough to start sessions against locally.

use std::fmt;

use exam_core::model::{AnswerId, AnswerOption, Question, QuestionId, QuestionType, Section, UserId};
use exam_core::policy;
use storage::repository::{Storage, StorageError};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    /// questions per section beyond the exam quota
    extra: u32,
    users: u32,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidExtra { raw: String },
    InvalidUsers { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidExtra { raw } => write!(f, "invalid --extra value: {raw}"),
            ArgsError::InvalidUsers { raw } => write!(f, "invalid --users value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:exam.sqlite3".into());
        let mut extra = 2_u32;
        let mut users = 2_u32;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = require_value(&mut args, "--db")?,
                "--extra" => {
                    let raw = require_value(&mut args, "--extra")?;
                    extra = raw.parse().map_err(|_| ArgsError::InvalidExtra { raw })?;
                }
                "--users" => {
                    let raw = require_value(&mut args, "--users")?;
                    users = raw.parse().map_err(|_| ArgsError::InvalidUsers { raw })?;
                }
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => return Err(ArgsError::UnknownArg(other.to_owned())),
            }
        }

        Ok(Self {
            db_url,
            extra,
            users,
        })
    }
}

fn print_usage() {
    eprintln!("Usage: seed [--db <url>] [--extra <n>] [--users <n>]");
    eprintln!();
    eprintln!("  --db <url>     database URL (default: DATABASE_URL or sqlite:exam.sqlite3)");
    eprintln!("  --extra <n>    questions per section beyond the exam quota (default: 2)");
    eprintln!("  --users <n>    demo user rows to create (default: 2)");
}

fn section_base(section: Section) -> i64 {
    match section {
        Section::Objects => 1000,
        Section::Classes => 2000,
        Section::Builtins => 3000,
        Section::AdvFunc => 4000,
    }
}

fn sample_text(section: Section, n: i64) -> String {
    let topic = match section {
        Section::Objects => "property descriptors",
        Section::Classes => "class fields and inheritance",
        Section::Builtins => "built-in object methods",
        Section::AdvFunc => "closures and higher-order functions",
    };
    format!("Sample question #{n} on {topic}. Which statements apply?")
}

fn build_question(section: Section, offset: i64) -> (Question, Vec<AnswerOption>) {
    let id = QuestionId::new(section_base(section) + offset);
    // every third question is multi-choice
    let qtype = if offset % 3 == 0 {
        QuestionType::Multi
    } else {
        QuestionType::Single
    };
    let question = Question {
        id,
        section,
        qtype,
        text: sample_text(section, offset + 1),
        code_snippet: (offset % 2 == 0).then(|| "const obj = Object.create(null);".to_owned()),
        explanation: Some("See the language reference for details.".to_owned()),
        is_active: true,
    };
    let correct_count = match qtype {
        QuestionType::Single => 1,
        QuestionType::Multi => 2,
    };
    let options = (1..=4)
        .map(|k| AnswerOption {
            id: AnswerId::new(id.value() * 10 + k),
            question_id: id,
            text: format!("Answer choice {k}"),
            is_correct: k <= correct_count,
            order_index: u32::try_from(k).unwrap_or(u32::MAX),
        })
        .collect();
    (question, options)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let mut inserted = 0_u32;
    let mut skipped = 0_u32;
    for (section, quota) in policy::DISTRIBUTION {
        for offset in 0..i64::from(quota + args.extra) {
            let (question, options) = build_question(section, offset);
            question.validate_options(&options)?;
            match storage.questions.insert_question(&question, &options).await {
                Ok(()) => inserted += 1,
                // already seeded on a previous run
                Err(StorageError::Conflict) => skipped += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    for id in 1..=i64::from(args.users) {
        storage.users.ensure_user(UserId::new(id)).await?;
    }

    tracing::info!(
        db = %args.db_url,
        inserted,
        skipped,
        users = args.users,
        "seed complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("seed failed: {e}");
        std::process::exit(1);
    }
}
