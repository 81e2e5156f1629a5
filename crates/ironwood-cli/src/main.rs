//! Batch front-end for the ironwood reference model.
//!
//! Subcommands:
//!
//! - `generate`: synthesize a workload and write it as JSONL
//! - `replay`:   replay a workload against the model, report outcomes
//! - `print`:    render a workload human-readably
//! - `decode`:   convert a log record stream into a workload
//! - `verify`:   replay a workload, then diff an engine dump against the
//!   model's committed view
//!
//! Batch semantics: on a fatal model/generator error the offending
//! operation, table, or key is printed and the process exits with the
//! error's code; there is no partial recovery mid-run.

use std::ffi::OsString;
use std::io::Write;

use ironwood_model::{Database, verify_table};
use ironwood_txlog::LogDecoder;
use ironwood_types::Value;
use ironwood_workload::{
    GeneratorConfig, Replayer, RngSpec, Workload, WorkloadHeader, generate,
};

const USAGE: &str = "\
usage: ironwood <command> [options]

commands:
  generate [--seed N] [--sequences N] [--tables N] [--out FILE]
  replay   --workload FILE
  print    --workload FILE
  decode   --log FILE [--out FILE]
  verify   --workload FILE --table NAME --dump FILE

Workloads and engine dumps are JSONL. An engine dump holds one
[key, value] pair per line, in the engine's cursor order.
";

fn main() {
    let exit_code = run(std::env::args_os(), &mut std::io::stdout(), &mut std::io::stderr());
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

#[derive(Debug, Default)]
struct Options {
    command: Option<String>,
    seed: Option<u64>,
    sequences: Option<usize>,
    tables: Option<usize>,
    out: Option<String>,
    workload: Option<String>,
    log: Option<String>,
    table: Option<String>,
    dump: Option<String>,
    show_help: bool,
}

fn run<I, W, E>(args: I, out: &mut W, err: &mut E) -> i32
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let options = match parse_args(args) {
        Ok(options) => options,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            let _ = err.write_all(USAGE.as_bytes());
            return 2;
        }
    };

    if options.show_help {
        let _ = out.write_all(USAGE.as_bytes());
        return 0;
    }

    let result = match options.command.as_deref() {
        Some("generate") => run_generate(&options, out),
        Some("replay") => run_replay(&options, out),
        Some("print") => run_print(&options, out),
        Some("decode") => run_decode(&options, out),
        Some("verify") => run_verify(&options, out),
        Some(other) => Err(format!("unknown command \"{other}\"")),
        None => Err("no command given".to_owned()),
    };

    match result {
        Ok(code) => code,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            1
        }
    }
}

#[allow(clippy::too_many_lines)]
fn parse_args<I>(args: I) -> Result<Options, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut iter = args.into_iter();
    let _argv0 = iter.next();
    let mut options = Options::default();

    while let Some(argument) = iter.next() {
        let arg = argument.to_string_lossy().into_owned();
        let mut take_value = |what: &str| -> Result<String, String> {
            iter.next()
                .map(|v| v.to_string_lossy().into_owned())
                .ok_or_else(|| format!("{what} requires a value"))
        };

        match arg.as_str() {
            "-h" | "--help" => options.show_help = true,
            "--seed" => {
                options.seed =
                    Some(take_value("--seed")?.parse().map_err(|_| "--seed must be an integer")?);
            }
            "--sequences" => {
                options.sequences = Some(
                    take_value("--sequences")?
                        .parse()
                        .map_err(|_| "--sequences must be an integer")?,
                );
            }
            "--tables" => {
                options.tables = Some(
                    take_value("--tables")?
                        .parse()
                        .map_err(|_| "--tables must be an integer")?,
                );
            }
            "--out" => options.out = Some(take_value("--out")?),
            "--workload" => options.workload = Some(take_value("--workload")?),
            "--log" => options.log = Some(take_value("--log")?),
            "--table" => options.table = Some(take_value("--table")?),
            "--dump" => options.dump = Some(take_value("--dump")?),
            other if other.starts_with('-') => {
                return Err(format!("unknown option \"{other}\""));
            }
            command if options.command.is_none() => {
                options.command = Some(command.to_owned());
            }
            extra => return Err(format!("unexpected argument \"{extra}\"")),
        }
    }

    Ok(options)
}

fn read_workload(options: &Options) -> Result<Workload, String> {
    let path = options
        .workload
        .as_deref()
        .ok_or("--workload FILE is required")?;
    let text =
        std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
    Workload::from_jsonl(&text).map_err(|e| format!("malformed workload {path}: {e}"))
}

fn write_output(out: &mut impl Write, path: Option<&str>, text: &str) -> Result<(), String> {
    match path {
        Some(path) => {
            std::fs::write(path, text).map_err(|e| format!("cannot write {path}: {e}"))
        }
        None => out.write_all(text.as_bytes()).map_err(|e| e.to_string()),
    }
}

fn run_generate(options: &Options, out: &mut impl Write) -> Result<i32, String> {
    let mut config = GeneratorConfig::default();
    if let Some(seed) = options.seed {
        config.seed = seed;
    }
    if let Some(sequences) = options.sequences {
        config.sequence_count = sequences;
    }
    if let Some(tables) = options.tables {
        config.table_count = tables;
    }

    match generate(config) {
        Ok(workload) => {
            let text = workload.to_jsonl().map_err(|e| e.to_string())?;
            write_output(out, options.out.as_deref(), &text)?;
            Ok(0)
        }
        Err(err) => {
            let _ = writeln!(out, "generation failed: {err}");
            Ok(err.exit_code())
        }
    }
}

fn replay_into(db: &Database, workload: &Workload, out: &mut impl Write) -> Result<i32, String> {
    let mut replayer = Replayer::new(db);
    match replayer.replay(&workload.ops) {
        Ok(report) => {
            let _ = writeln!(
                out,
                "replayed {} operations, {} data-dependent failures",
                report.outcomes.len(),
                report.failure_count()
            );
            Ok(0)
        }
        // The replayer already embeds the offending operation's position
        // and rendering in the error.
        Err(err) => {
            let _ = writeln!(out, "{err}");
            Ok(err.exit_code())
        }
    }
}

fn run_replay(options: &Options, out: &mut impl Write) -> Result<i32, String> {
    let workload = read_workload(options)?;
    let db = Database::new();
    replay_into(&db, &workload, out)
}

fn run_print(options: &Options, out: &mut impl Write) -> Result<i32, String> {
    let workload = read_workload(options)?;
    let _ = writeln!(
        out,
        "# seed={} rng={} ops={}",
        workload.header.seed,
        workload.header.rng.algorithm,
        workload.ops.len()
    );
    for (pos, op) in workload.ops.iter().enumerate() {
        let _ = writeln!(out, "{pos:6}  {op}");
    }
    Ok(0)
}

fn run_decode(options: &Options, out: &mut impl Write) -> Result<i32, String> {
    let path = options.log.as_deref().ok_or("--log FILE is required")?;
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;

    let ops = match LogDecoder::decode_stream(&text) {
        Ok(ops) => ops,
        Err(err) => {
            let _ = writeln!(out, "decode failed: {err}");
            return Ok(err.exit_code());
        }
    };

    let workload = Workload {
        header: WorkloadHeader {
            seed: 0,
            rng: RngSpec::default(),
            config: GeneratorConfig::default(),
        },
        ops,
    };
    let text = workload.to_jsonl().map_err(|e| e.to_string())?;
    write_output(out, options.out.as_deref(), &text)?;
    Ok(0)
}

fn run_verify(options: &Options, out: &mut impl Write) -> Result<i32, String> {
    let workload = read_workload(options)?;
    let table_name = options.table.as_deref().ok_or("--table NAME is required")?;
    let dump_path = options.dump.as_deref().ok_or("--dump FILE is required")?;

    let dump_text = std::fs::read_to_string(dump_path)
        .map_err(|e| format!("cannot read {dump_path}: {e}"))?;
    let mut cursor: Vec<(Value, Value)> = Vec::new();
    for line in dump_text.lines().filter(|l| !l.trim().is_empty()) {
        let pair: (Value, Value) =
            serde_json::from_str(line).map_err(|e| format!("malformed dump line: {e}"))?;
        cursor.push(pair);
    }

    let db = Database::new();
    let mut replayer = Replayer::new(&db);
    if let Err(err) = replayer.replay(&workload.ops) {
        let _ = writeln!(out, "{err}");
        return Ok(err.exit_code());
    }

    let table = match db.table_by_name(table_name) {
        Ok(table) => table,
        Err(err) => {
            let _ = writeln!(out, "{err}");
            return Ok(err.exit_code());
        }
    };

    match verify_table(&table, cursor) {
        Ok(()) => {
            let _ = writeln!(out, "table {table_name}: verified");
            Ok(0)
        }
        Err(failure) => {
            let _ = writeln!(out, "verification failed: {failure}");
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironwood_workload::Operation;

    fn run_cli(args: &[&str]) -> (i32, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let argv = std::iter::once(OsString::from("ironwood"))
            .chain(args.iter().map(|a| OsString::from(*a)));
        let code = run(argv, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn help_prints_usage() {
        let (code, out, _) = run_cli(&["--help"]);
        assert_eq!(code, 0);
        assert!(out.contains("usage: ironwood"));
    }

    #[test]
    fn unknown_command_fails() {
        let (code, _, err) = run_cli(&["frobnicate"]);
        assert_eq!(code, 1);
        assert!(err.contains("unknown command"));
    }

    #[test]
    fn missing_value_fails_with_usage() {
        let (code, _, err) = run_cli(&["generate", "--seed"]);
        assert_eq!(code, 2);
        assert!(err.contains("--seed requires a value"));
    }

    #[test]
    fn generate_then_replay_and_print() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.jsonl");
        let path = path.to_str().unwrap();

        let (code, _, err) =
            run_cli(&["generate", "--seed", "9", "--sequences", "20", "--out", path]);
        assert_eq!(code, 0, "generate failed: {err}");

        let (code, out, _) = run_cli(&["replay", "--workload", path]);
        assert_eq!(code, 0);
        assert!(out.contains("replayed"));

        let (code, out, _) = run_cli(&["print", "--workload", path]);
        assert_eq!(code, 0);
        assert!(out.contains("# seed=9"));
        assert!(out.lines().count() > 20);
    }

    #[test]
    fn generate_to_stdout() {
        let (code, out, _) = run_cli(&["generate", "--seed", "3", "--sequences", "5"]);
        assert_eq!(code, 0);
        assert!(out.lines().count() > 5);
    }

    #[test]
    fn verify_against_model_dump() {
        let dir = tempfile::tempdir().unwrap();
        let workload_path = dir.path().join("w.jsonl");
        let dump_path = dir.path().join("dump.jsonl");

        // Build a tiny hand-rolled workload.
        let workload = Workload {
            header: WorkloadHeader {
                seed: 0,
                rng: RngSpec::default(),
                config: GeneratorConfig::default(),
            },
            ops: vec![
                Operation::CreateTable {
                    table: ironwood_types::TableId::new(1),
                    name: "t".to_owned(),
                    key_format: ironwood_types::FormatType::Unsigned(8),
                    value_format: ironwood_types::FormatType::Text,
                },
                Operation::Insert {
                    table: ironwood_types::TableId::new(1),
                    txn: None,
                    key: Value::UInt(1),
                    value: "a".into(),
                    overwrite: true,
                },
            ],
        };
        std::fs::write(&workload_path, workload.to_jsonl().unwrap()).unwrap();

        let good = serde_json::to_string(&(Value::UInt(1), Value::from("a"))).unwrap();
        std::fs::write(&dump_path, format!("{good}\n")).unwrap();
        let (code, out, _) = run_cli(&[
            "verify",
            "--workload",
            workload_path.to_str().unwrap(),
            "--table",
            "t",
            "--dump",
            dump_path.to_str().unwrap(),
        ]);
        assert_eq!(code, 0, "{out}");
        assert!(out.contains("verified"));

        let bad = serde_json::to_string(&(Value::UInt(1), Value::from("wrong"))).unwrap();
        std::fs::write(&dump_path, format!("{bad}\n")).unwrap();
        let (code, out, _) = run_cli(&[
            "verify",
            "--workload",
            workload_path.to_str().unwrap(),
            "--table",
            "t",
            "--dump",
            dump_path.to_str().unwrap(),
        ]);
        assert_eq!(code, 1);
        assert!(out.contains("verification failed"));
    }

    #[test]
    fn decode_log_stream() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.jsonl");
        let stream = concat!(
            r#"{"type":"metadata","file_id":1,"uri":"table:t","key_format":"Q","value_format":"S"}"#,
            "\n",
            r#"{"type":"data","file_id":1,"txn":1,"op":"put","key":[0,0,0,0,0,0,0,5],"value":[104,105,0]}"#,
            "\n",
            r#"{"type":"timestamp","txn":1,"commit_ts":30}"#,
            "\n",
        );
        std::fs::write(&log_path, stream).unwrap();

        let (code, out, _) = run_cli(&["decode", "--log", log_path.to_str().unwrap()]);
        assert_eq!(code, 0);
        assert!(out.contains("CommitTransaction"));

        // A rejected shape exits non-zero with the unsupported code.
        std::fs::write(
            &log_path,
            r#"{"type":"metadata","file_id":1,"uri":"lsm:x","key_format":"Q","value_format":"S"}"#,
        )
        .unwrap();
        let (code, out, _) = run_cli(&["decode", "--log", log_path.to_str().unwrap()]);
        assert_eq!(code, 4);
        assert!(out.contains("unsupported"));
    }
}
