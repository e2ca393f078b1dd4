//! Command line -> Configuration.
//!
//! Layout of an accepted command:
//!
//! ```text
//! [mlr] <flag region> <verb region> [input path]
//! ```
//!
//! The flag region is the leading run of `-`-prefixed tokens. Flags from the closed vocabulary
//! fill their configuration slot; everything else in that region (plus the value of a few
//! known valued flags) is folded into `options`. The verb region is split on bare `then`;
//! each stage keeps its raw source text so quoting survives a round trip.
//!
//! A trailing word is only taken as the input file when it looks like one: it contains a path
//! separator or ends in a known data extension. A bare name such as `input` stays verb text,
//! so `cat input` keeps text mode.

use super::lexer::{Token, tokenize};
use super::{CONNECTIVE, TOOL_NAME};
use crate::config::{Configuration, InputFormat, OutputFormat, VerbStep};
use crate::error::ParseError;

/// Main flags outside the closed vocabulary that take a value; the value rides along into `options`.
const VALUED_PASSTHROUGH: &[&str] = &[
    "--ofs",
    "--ips",
    "--ops",
    "--irs",
    "--ors",
    "--fs",
    "--ps",
    "--rs",
    "--from",
    "--load",
    "--mload",
    "--tz",
    "--nr-progress-mod",
    "--records-per-batch",
    "--ifs-regex",
    "--ips-regex",
    "--ofmt",
    "--fflatsep",
    "--flatsep",
    "--iflatsep",
    "--oflatsep",
    "--jflatsep",
    "--seed",
    "--prepipe",
    "--prepipex",
];

/// Extensions that mark a trailing word as an input file.
const DATA_EXTENSIONS: &[&str] = &[
    ".csv", ".tsv", ".json", ".jsonl", ".ndjson", ".txt", ".dat", ".log", ".dkvp", ".nidx", ".xtab",
    ".pprint", ".md", ".usv", ".asv", ".ssv", ".psv", ".tbl", ".gz", ".bz2", ".zst", ".z",
];

/// Verbs whose single positional argument is an output file, not input.
const FILE_ARGUMENT_VERBS: &[&str] = &["tee"];

/// Verb flags whose value is a file or file prefix, so it must stay with the verb.
const PATH_VALUED_VERB_FLAGS: &[(&str, &[&str])] = &[
    ("put", &["-f"]),
    ("filter", &["-f"]),
    ("join", &["-f", "--prepipe", "--prepipex"]),
    ("split", &["--prefix", "--suffix"]),
    ("template", &["-t"]),
];

fn takes_path_value(verb: &str, flag: &str) -> bool {
    PATH_VALUED_VERB_FLAGS
        .iter()
        .any(|(v, flags)| *v == verb && flags.contains(&flag))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recognized {
    Input(InputFormat),
    Output(OutputFormat),
    Both(InputFormat, OutputFormat),
    Ragged,
    Headerless,
    Separator,
}

fn classify(flag: &str) -> Option<Recognized> {
    let recognized = match flag {
        "--icsv" => Recognized::Input(InputFormat::Csv),
        "--itsv" => Recognized::Input(InputFormat::Tsv),
        "--ijson" => Recognized::Input(InputFormat::Json),
        "--ijsonl" | "--indjson" => Recognized::Input(InputFormat::Ndjson),
        "--opprint" => Recognized::Output(OutputFormat::Pprint),
        "--ocsv" => Recognized::Output(OutputFormat::Csv),
        "--otsv" => Recognized::Output(OutputFormat::Tsv),
        "--ojson" => Recognized::Output(OutputFormat::Json),
        "--ojsonl" | "--ondjson" => Recognized::Output(OutputFormat::Ndjson),
        "--csv" => Recognized::Both(InputFormat::Csv, OutputFormat::Csv),
        "--tsv" => Recognized::Both(InputFormat::Tsv, OutputFormat::Tsv),
        "--json" => Recognized::Both(InputFormat::Json, OutputFormat::Json),
        "--jsonl" => Recognized::Both(InputFormat::Ndjson, OutputFormat::Ndjson),
        "--ragged" => Recognized::Ragged,
        "--headerless-csv-input" | "--headerless" | "--hi" => Recognized::Headerless,
        "--ifs" => Recognized::Separator,
        other => return classify_shorthand(other),
    };
    Some(recognized)
}

/// `--c2j`, `--t2p` and friends.
fn classify_shorthand(flag: &str) -> Option<Recognized> {
    let body = flag.strip_prefix("--")?;
    let mut chars = body.chars();
    let (from, two, to) = (chars.next()?, chars.next()?, chars.next()?);
    if two != '2' || chars.next().is_some() || from == to {
        return None;
    }
    let input = match from {
        'c' => InputFormat::Csv,
        't' => InputFormat::Tsv,
        'j' => InputFormat::Json,
        'l' => InputFormat::Ndjson,
        _ => return None,
    };
    let output = match to {
        'c' => OutputFormat::Csv,
        't' => OutputFormat::Tsv,
        'j' => OutputFormat::Json,
        'l' => OutputFormat::Ndjson,
        'p' => OutputFormat::Pprint,
        _ => return None,
    };
    Some(Recognized::Both(input, output))
}

/// A configuration slot filled at most once, remembering which flag filled it.
struct Slot<T> {
    name: &'static str,
    filled: Option<(T, String)>,
}

impl<T> Slot<T> {
    fn new(name: &'static str) -> Self {
        Self { name, filled: None }
    }

    fn claim(&mut self, value: T, token: &Token<'_>) -> Result<(), ParseError> {
        if let Some((_, previous)) = &self.filled {
            return Err(ParseError::DuplicateFlag {
                flag: token.value.clone(),
                previous: previous.clone(),
                slot: self.name,
                position: token.start,
            });
        }
        self.filled = Some((value, token.value.clone()));
        Ok(())
    }

    fn take(self) -> Option<T> {
        self.filled.map(|(v, _)| v)
    }
}

/// Collects the spans of tokens nobody claimed, merging adjacent ones.
#[derive(Default)]
struct Unclassified {
    runs: Vec<(usize, usize)>,
    last_index: Option<usize>,
}

impl Unclassified {
    fn push(&mut self, index: usize, token: &Token<'_>) {
        match (self.last_index, self.runs.last_mut()) {
            (Some(last), Some(run)) if last + 1 == index => run.1 = token.end,
            _ => self.runs.push((token.start, token.end)),
        }
        self.last_index = Some(index);
    }

    /// Source text of each run; spacing inside a run is preserved.
    fn render(&self, input: &str) -> String {
        self.runs
            .iter()
            .map(|&(start, end)| &input[start..end])
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_tool_name(token: &Token<'_>) -> bool {
    let base = token
        .value
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    base == TOOL_NAME || base.eq_ignore_ascii_case("mlr.exe")
}

fn looks_like_path(token: &Token<'_>) -> bool {
    let v = token.value.as_str();
    if v.is_empty() || v.starts_with('-') || v.contains('$') || token.is_bare(CONNECTIVE) {
        return false;
    }
    if !v.chars().any(char::is_alphanumeric) {
        return false;
    }
    let lower = v.to_ascii_lowercase();
    v.contains('/') || v.contains('\\') || DATA_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Index (within `region`) of a trailing input-file token, if there is one.
fn trailing_path(region: &[Token<'_>]) -> Option<usize> {
    let last_index = region.len().checked_sub(1)?;
    let last = region.get(last_index)?;
    if !looks_like_path(last) {
        return None;
    }
    if last_index == 0 {
        return Some(0);
    }

    let stage_start = region[..last_index]
        .iter()
        .rposition(|t| t.is_bare(CONNECTIVE))
        .map(|i| i + 1)
        .unwrap_or(0);
    if stage_start == last_index {
        // The word is the whole final stage: a verb, not a file.
        return None;
    }
    let stage = &region[stage_start..last_index];
    let verb = stage[0].value.as_str();
    if takes_path_value(verb, &region[last_index - 1].value) {
        return None;
    }
    // tee with no positional argument yet: the word is its output file.
    if FILE_ARGUMENT_VERBS.contains(&verb) && stage[1..].iter().all(|t| t.is_flag_like()) {
        return None;
    }
    Some(last_index)
}

/// Parses a pasted command line into a fresh configuration.
///
/// `current` only supplies the input mode and path when the command names no input file;
/// it is never modified, and on error the caller simply keeps it.
pub fn parse_command(input: &str, current: &Configuration) -> Result<Configuration, ParseError> {
    let tokens = tokenize(input)?;
    let mut idx = 0;

    if tokens.first().is_some_and(is_tool_name) {
        idx = 1;
    }

    let mut input_format = Slot::new("input format");
    let mut output_format = Slot::new("output format");
    let mut ragged = Slot::new("ragged");
    let mut headerless = Slot::new("headerless");
    let mut separator = Slot::new("field separator");
    let mut unclassified = Unclassified::default();

    while let Some(token) = tokens.get(idx) {
        if !token.is_flag_like() {
            break;
        }
        match classify(&token.value) {
            Some(Recognized::Input(fmt)) => input_format.claim(fmt, token)?,
            Some(Recognized::Output(fmt)) => output_format.claim(fmt, token)?,
            Some(Recognized::Both(i, o)) => {
                input_format.claim(i, token)?;
                output_format.claim(o, token)?;
            }
            Some(Recognized::Ragged) => ragged.claim((), token)?,
            Some(Recognized::Headerless) => headerless.claim((), token)?,
            Some(Recognized::Separator) => {
                let value = tokens.get(idx + 1).ok_or_else(|| ParseError::MissingValue {
                    flag: token.value.clone(),
                    position: token.start,
                })?;
                separator.claim(value.value.clone(), token)?;
                idx += 1;
            }
            None => {
                unclassified.push(idx, token);
                if VALUED_PASSTHROUGH.contains(&token.value.as_str())
                    && let Some(value) = tokens.get(idx + 1)
                {
                    idx += 1;
                    unclassified.push(idx, value);
                }
            }
        }
        idx += 1;
    }

    let mut region = &tokens[idx..];
    let mut input_path = None;
    if let Some(path_index) = trailing_path(region) {
        input_path = Some(region[path_index].value.clone());
        region = &region[..path_index];
    }

    let verbs = split_stages(input, region)?;

    let mut config = Configuration {
        input_path: current.input_path.clone(),
        input_mode: current.input_mode,
        input_format: input_format.take().unwrap_or_default(),
        ragged: ragged.take().is_some(),
        headerless: headerless.take().is_some(),
        output_format: output_format.take().unwrap_or_default(),
        verbs,
        options: unclassified.render(input),
        ..Configuration::default()
    }
    .with_field_separator(separator.take().unwrap_or_default());

    if let Some(path) = input_path {
        config = config.with_input_file(path);
    }

    tracing::debug!(
        verbs = config.verbs.len(),
        input_format = %config.input_format,
        output_format = %config.output_format,
        has_path = config.file_input().is_some(),
        "parsed command"
    );
    Ok(config)
}

/// Splits the verb region on bare connectives; stage text is the raw source slice.
fn split_stages(input: &str, region: &[Token<'_>]) -> Result<Vec<VerbStep>, ParseError> {
    let mut verbs = Vec::new();
    if region.is_empty() {
        return Ok(verbs);
    }

    let mut stage_start = 0;
    for (i, token) in region.iter().enumerate() {
        if token.is_bare(CONNECTIVE) {
            verbs.push(stage_text(input, &region[stage_start..i], token.start)?);
            stage_start = i + 1;
        }
    }
    let dangling = region.last().map(|t| t.start).unwrap_or_default();
    verbs.push(stage_text(input, &region[stage_start..], dangling)?);
    Ok(verbs)
}

fn stage_text(input: &str, stage: &[Token<'_>], connective_at: usize) -> Result<VerbStep, ParseError> {
    let (Some(first), Some(last)) = (stage.first(), stage.last()) else {
        return Err(ParseError::EmptyStage {
            position: connective_at,
        });
    };
    VerbStep::new(&input[first.start..last.end]).ok_or(ParseError::EmptyStage {
        position: connective_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::synthesize;
    use crate::config::InputMode;
    use crate::error::{LexError, ParseErrorKind};

    fn parse(input: &str) -> Result<Configuration, ParseError> {
        parse_command(input, &Configuration::default())
    }

    fn verb_texts(config: &Configuration) -> Vec<&str> {
        config.verbs.iter().map(|v| v.text.as_str()).collect()
    }

    #[test]
    fn formats_verbs_and_path() {
        let c = parse("mlr --icsv --ojson sort -f field1 then head -n 5 /tmp/a.csv").unwrap();
        assert_eq!(c.input_format, InputFormat::Csv);
        assert_eq!(c.output_format, OutputFormat::Json);
        assert_eq!(verb_texts(&c), vec!["sort -f field1", "head -n 5"]);
        assert!(c.verbs.iter().all(|v| v.enabled));
        assert_eq!(c.input_mode, InputMode::File);
        assert_eq!(c.input_path, "/tmp/a.csv");
    }

    #[test]
    fn simple_head_command() {
        let c = parse("mlr --icsv --opprint head -n 5").unwrap();
        assert_eq!(c.input_format, InputFormat::Csv);
        assert_eq!(c.output_format, OutputFormat::Pprint);
        assert_eq!(verb_texts(&c), vec!["head -n 5"]);
        assert_eq!(c.options, "");
        assert_eq!(c.input_mode, InputMode::Text);
    }

    #[test]
    fn tool_name_is_optional() {
        let c = parse("--icsv --opprint head -n 5").unwrap();
        assert_eq!(c.input_format, InputFormat::Csv);
        assert_eq!(verb_texts(&c), vec!["head -n 5"]);

        let c = parse("/usr/local/bin/mlr --ijsonl cat").unwrap();
        assert_eq!(c.input_format, InputFormat::Ndjson);
        assert_eq!(verb_texts(&c), vec!["cat"]);
    }

    #[test]
    fn unknown_flags_fold_into_options() {
        let c = parse("mlr --skip-comments --icsv head -n 5").unwrap();
        assert_eq!(c.input_format, InputFormat::Csv);
        assert_eq!(c.options, "--skip-comments");
        assert_eq!(verb_texts(&c), vec!["head -n 5"]);
    }

    #[test]
    fn options_keep_order_and_inner_spacing() {
        let c = parse("mlr -n  --from x.csv --icsv --ofs ';'   --allow-ragged-csv-input cat").unwrap();
        assert_eq!(c.options, "-n  --from x.csv --ofs ';'   --allow-ragged-csv-input");
        assert_eq!(verb_texts(&c), vec!["cat"]);
        assert_eq!(c.input_mode, InputMode::Text, "--from value is not the trailing path");
    }

    #[test]
    fn complex_command_with_file_path() {
        let c = parse(
            "mlr --itsv --ragged --headerless-csv-input --opprint --implicit-csv-header head -n 50 \
             then put \"$row_length = length($0)\" then label category /home/thomas/Downloads/import_de.txt",
        )
        .unwrap();
        assert_eq!(c.input_format, InputFormat::Tsv);
        assert_eq!(c.output_format, OutputFormat::Pprint);
        assert!(c.ragged);
        assert!(c.headerless);
        assert_eq!(c.options, "--implicit-csv-header");
        assert_eq!(verb_texts(&c), vec![
            "head -n 50",
            "put \"$row_length = length($0)\"",
            "label category"
        ]);
        assert_eq!(c.input_path, "/home/thomas/Downloads/import_de.txt");
    }

    #[test]
    fn separator_consumes_and_unquotes_value() {
        let c = parse("mlr --icsv --ifs ';' cat").unwrap();
        assert_eq!(c.field_separator, ";");
        let c = parse("mlr --icsv --ifs semicolon cat").unwrap();
        assert_eq!(c.field_separator, "semicolon");
    }

    #[test]
    fn separator_without_value_is_arity_error() {
        let err = parse("mlr --icsv --ifs").unwrap_err();
        assert_eq!(err, ParseError::MissingValue {
            flag: "--ifs".into(),
            position: 11
        });
        assert_eq!(err.kind(), ParseErrorKind::Semantic);
    }

    #[test]
    fn duplicate_flags_fail() {
        let err = parse("mlr --icsv --ragged --ragged cat").unwrap_err();
        assert!(matches!(err, ParseError::DuplicateFlag { slot: "ragged", position: 20, .. }));

        let err = parse("mlr --icsv --ijson cat").unwrap_err();
        match err {
            ParseError::DuplicateFlag { flag, previous, .. } => {
                assert_eq!(flag, "--ijson");
                assert_eq!(previous, "--icsv");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(parse("mlr --c2j --ojson cat").is_err(), "shorthand fills both slots");
    }

    #[test]
    fn shorthand_and_combined_format_flags() {
        let c = parse("mlr --c2p cat").unwrap();
        assert_eq!(c.input_format, InputFormat::Csv);
        assert_eq!(c.output_format, OutputFormat::Pprint);

        let c = parse("mlr --json cat").unwrap();
        assert_eq!(c.input_format, InputFormat::Json);
        assert_eq!(c.output_format, OutputFormat::Json);

        let c = parse("mlr --c2m cat").unwrap();
        assert_eq!(c.options, "--c2m", "markdown output is not modelled");
    }

    #[test]
    fn unterminated_quote_is_lex_error() {
        let err = parse(r#"mlr --icsv filter '$SKU == "X"#).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::Lex);
        assert_eq!(err, ParseError::Lex(LexError::UnterminatedQuote {
            quote: '\'',
            position: 18
        }));
    }

    #[test]
    fn quoted_then_does_not_split() {
        let c = parse(r#"mlr put '$x = "then"' then cat"#).unwrap();
        assert_eq!(verb_texts(&c), vec![r#"put '$x = "then"'"#, "cat"]);
    }

    #[test]
    fn dangling_connective_is_empty_stage() {
        assert!(matches!(parse("mlr cat then"), Err(ParseError::EmptyStage { .. })));
        assert!(matches!(parse("mlr --icsv then cat"), Err(ParseError::EmptyStage { position: 11 })));
        assert!(matches!(parse("mlr cat then then head"), Err(ParseError::EmptyStage { .. })));
    }

    #[test]
    fn path_heuristics() {
        // Single word stage is the verb itself.
        let c = parse("mlr --icsv cat then data.csv").unwrap();
        assert_eq!(verb_texts(&c), vec!["cat", "data.csv"]);
        assert_eq!(c.input_mode, InputMode::Text);

        // Values of file-valued verb flags are not the input.
        let c = parse("mlr split -n 10 --prefix /tmp/out").unwrap();
        assert_eq!(verb_texts(&c), vec!["split -n 10 --prefix /tmp/out"]);
        let c = parse("mlr --icsv join -j id -f left.csv").unwrap();
        assert_eq!(verb_texts(&c), vec!["join -j id -f left.csv"]);
        assert_eq!(c.input_mode, InputMode::Text);
        let c = parse("mlr --icsv join -j id -f left.csv right.csv").unwrap();
        assert_eq!(verb_texts(&c), vec!["join -j id -f left.csv"]);
        assert_eq!(c.input_path, "right.csv");

        // tee writes to its argument.
        let c = parse("mlr --icsv tee /tmp/copy.csv").unwrap();
        assert_eq!(verb_texts(&c), vec!["tee /tmp/copy.csv"]);
        let c = parse("mlr --icsv tee -a /tmp/copy.csv").unwrap();
        assert_eq!(verb_texts(&c), vec!["tee -a /tmp/copy.csv"]);
        let c = parse("mlr --icsv tee /tmp/copy.csv /tmp/in.csv").unwrap();
        assert_eq!(verb_texts(&c), vec!["tee /tmp/copy.csv"]);
        assert_eq!(c.input_path, "/tmp/in.csv");

        // A bare name without separator or extension stays verb text.
        let c = parse("mlr --icsv cat input").unwrap();
        assert_eq!(verb_texts(&c), vec!["cat input"]);
        assert_eq!(c.input_mode, InputMode::Text);

        // DSL expressions are not paths.
        let c = parse("mlr put '$y = $x / 2'").unwrap();
        assert_eq!(c.input_mode, InputMode::Text);

        // Quoted path with spaces.
        let c = parse("mlr cat '/tmp/my data.csv'").unwrap();
        assert_eq!(c.input_path, "/tmp/my data.csv");
        assert_eq!(verb_texts(&c), vec!["cat"]);

        // A lone path with no verbs.
        let c = parse("mlr --icsv ./input.csv").unwrap();
        assert!(c.verbs.is_empty());
        assert_eq!(c.input_path, "./input.csv");
    }

    #[test]
    fn mode_and_path_fall_back_to_current() {
        let current = Configuration::default().with_input_file("/data/big.csv");
        let c = parse_command("mlr --icsv head -n 2", &current).unwrap();
        assert_eq!(c.input_mode, InputMode::File);
        assert_eq!(c.input_path, "/data/big.csv");
        assert_eq!(current.verbs.len(), 0, "current untouched");
    }

    #[test]
    fn empty_input_parses_to_empty_pipeline() {
        let c = parse("   ").unwrap();
        assert!(c.verbs.is_empty());
        let c = parse("mlr").unwrap();
        assert!(c.verbs.is_empty());
    }

    #[test]
    fn round_trip_configuration() {
        let original = Configuration::default()
            .with_input_format(InputFormat::Csv)
            .with_ragged(true)
            .with_headerless(true)
            .with_field_separator(";")
            .with_output_format(OutputFormat::Json)
            .with_options("--skip-comments")
            .with_verbs(vec![
                VerbStep::new(r#"filter '$SKU == "DAI-033"'"#).unwrap(),
                VerbStep::new("rename -g -r ' ,_'").unwrap(),
                VerbStep::new("sort -nr Price").unwrap(),
            ])
            .with_input_file("/tmp/in put.csv");

        let parsed = parse(&synthesize(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn trailing_boolean_verb_flag_keeps_the_path() {
        for verb in ["cat -n", "uniq -a", "sort -nr x -c", "count-distinct -u"] {
            let original = Configuration::default()
                .with_input_format(InputFormat::Csv)
                .with_verbs(vec![VerbStep::new(verb).unwrap()])
                .with_input_file("/tmp/a.csv");
            let command = synthesize(&original);
            assert_eq!(command, format!("mlr --icsv {verb} /tmp/a.csv"));
            assert_eq!(parse(&command).unwrap(), original, "{command}");
        }
    }

    #[test]
    fn valued_main_flags_round_trip_through_options() {
        for options in ["--ofmt %.4f", "--oflatsep :", "--seed 1234", "--jflatsep _ --ofmt %.2lf"] {
            let original = Configuration::default()
                .with_options(options)
                .with_verbs(vec![VerbStep::new("cat").unwrap()]);
            let parsed = parse(&synthesize(&original)).unwrap();
            assert_eq!(parsed.options, options);
            assert_eq!(verb_texts(&parsed), vec!["cat"]);
        }
    }

    #[test]
    fn round_trip_drops_disabled_verbs_only() {
        let original = Configuration::default()
            .with_input_format(InputFormat::Tsv)
            .with_verbs(vec![
                VerbStep::new("head -n 3").unwrap().disabled(),
                VerbStep::new("cat -n").unwrap(),
            ]);
        let parsed = parse(&synthesize(&original)).unwrap();
        assert_eq!(parsed.verbs, vec![VerbStep::new("cat -n").unwrap()]);
        assert_eq!(parsed.input_format, InputFormat::Tsv);
    }

    #[test]
    fn round_trip_command_normalizes_spacing_only() {
        let text = "mlr   --c2j  --ragged   cut -f  a,b   then  head -n 1   data/in.csv";
        let config = parse(text).unwrap();
        let again = synthesize(&config);
        assert_eq!(again, "mlr --icsv --ragged --ojson cut -f  a,b then head -n 1 data/in.csv");
        assert_eq!(parse(&again).unwrap(), config);
    }
}
