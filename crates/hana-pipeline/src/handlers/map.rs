//! Hi-C read mapping with `bwa` or `chromap`.
//!
//! Each read pair is mapped by its own process chain and recorded in the
//! status store as soon as it finishes, so an interrupted `map` resumes with
//! the first unfinished pair.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use hana_tools::{CommandLine, ProcessChain};
use hana_types::{HanaError, OperationPath, Outcome, Result, Status};
use hana_vars::{resolve, Environment};

use crate::context::RunContext;
use crate::handler::{Binding, OperationHandler};
use crate::operation::{Command, Operation};
use crate::params::{json_type_name, value_to_arg};

/// Status key holding finished pairs of in-flight `map` operations.
pub const MAP_PROGRESS_KEY: &str = "map_progress";

const PARAMS: [&str; 5] = ["contigs", "reads", "mapper", "args", "threads"];
const BWA_INDEX_SUFFIXES: [&str; 5] = [".amb", ".ann", ".bwt", ".pac", ".sa"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapper {
    Bwa,
    Chromap,
}

impl Mapper {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bwa" => Some(Mapper::Bwa),
            "chromap" => Some(Mapper::Chromap),
            _ => None,
        }
    }

    /// Status keys that must hold the executables this mapper runs.
    pub fn required_tools(&self) -> &'static [&'static str] {
        match self {
            Mapper::Bwa => &["bwa_path", "samtools_path"],
            Mapper::Chromap => &["chromap_path"],
        }
    }

    fn output_extension(&self) -> &'static str {
        match self {
            Mapper::Bwa => "bam",
            Mapper::Chromap => "pairs",
        }
    }
}

fn invalid(param: &str, message: impl Into<String>) -> HanaError {
    HanaError::InvalidValue {
        param: param.to_string(),
        message: message.into(),
    }
}

fn default_reference(name: &str) -> Value {
    match name {
        "mapper" => json!("chromap"),
        "threads" => json!("!"),
        _ => json!("$"),
    }
}

fn raw_param<'a>(op: &Operation<'a>, name: &str) -> Value {
    op.param(name)
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| default_reference(name))
}

fn parse_mapper(value: &Value) -> Result<Mapper> {
    value
        .as_str()
        .and_then(Mapper::from_name)
        .ok_or_else(|| invalid("mapper", format!("{value} is not a known mapper (bwa, chromap)")))
}

fn parse_args(value: Option<&Value>) -> Result<Option<Vec<String>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => {
            Ok(Some(items.iter().map(value_to_arg).collect()))
        }
        Some(other) => Err(HanaError::ParameterType {
            param: "args".into(),
            expected: "a list of strings".into(),
            found: json_type_name(other).into(),
        }),
    }
}

fn tool_path<'s>(status: &'s Status, key: &str) -> Result<&'s str> {
    match status.get_str(key) {
        Some(path) if !path.is_empty() => Ok(path),
        _ => Err(HanaError::ToolNotFound {
            tool: key.trim_end_matches("_path").to_string(),
        }),
    }
}

fn read_pairs(value: &Value) -> Result<Vec<(String, String)>> {
    let shape_error = || invalid("reads", "expected a list of [forward, reverse] pairs");
    let pairs = value.as_array().ok_or_else(shape_error)?;
    pairs
        .iter()
        .map(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([Value::String(fwd), Value::String(rev)]) => Ok((fwd.clone(), rev.clone())),
            _ => Err(shape_error()),
        })
        .collect()
}

fn finished_pairs(status: &Status, path: &OperationPath) -> Vec<String> {
    status
        .get(MAP_PROGRESS_KEY)
        .and_then(|p| p.get(path.key()))
        .and_then(Value::as_array)
        .map(|done| done.iter().map(value_to_arg).collect())
        .unwrap_or_default()
}

fn record_finished(status: &mut Status, path: &OperationPath, done: &[String]) {
    let mut progress = match status.get(MAP_PROGRESS_KEY) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    progress.insert(path.key(), json!(done));
    status.set(MAP_PROGRESS_KEY, Value::Object(progress));
}

fn clear_finished(status: &mut Status, path: &OperationPath) {
    let Some(Value::Object(mut progress)) = status.remove(MAP_PROGRESS_KEY) else {
        return;
    };
    progress.remove(&path.key());
    if !progress.is_empty() {
        status.set(MAP_PROGRESS_KEY, Value::Object(progress));
    }
}

// ---------------------------------------------------------------------------
// MapHandler
// ---------------------------------------------------------------------------

pub struct MapHandler;

impl MapHandler {
    async fn build_index(
        &self,
        mapper: Mapper,
        contigs: &str,
        ctx: &RunContext<'_>,
    ) -> Result<Option<String>> {
        let project = ctx.project_path();
        match mapper {
            Mapper::Bwa => {
                let indexed = BWA_INDEX_SUFFIXES
                    .iter()
                    .all(|ext| project.join(format!("{contigs}{ext}")).is_file());
                if indexed {
                    tracing::info!(contigs, "bwa index found, skipping indexing");
                } else {
                    let bwa = tool_path(ctx.status(), "bwa_path")?;
                    let index = CommandLine::new(bwa).arg("index").arg(contigs);
                    ctx.invoke(ProcessChain::single(index)).await?;
                }
                Ok(None)
            }
            Mapper::Chromap => {
                let index = format!("{contigs}.chromap_index");
                if project.join(&index).is_file() {
                    tracing::info!(index = %index, "chromap index found, skipping indexing");
                } else {
                    let chromap = tool_path(ctx.status(), "chromap_path")?;
                    let build = CommandLine::new(chromap)
                        .args(["-i", "-r", contigs, "-o", index.as_str()]);
                    ctx.invoke(ProcessChain::single(build)).await?;
                    ctx.check_output(&index)?;
                }
                Ok(Some(index))
            }
        }
    }
}

struct MapPlan {
    mapper: Mapper,
    contigs: String,
    pairs: Vec<(String, String)>,
    threads: String,
    args: Option<Vec<String>>,
}

fn plan_mapping(op: &Operation<'_>, env: &Environment<'_>) -> Result<MapPlan> {
    let resolve_required = |name: &str| -> Result<Value> {
        resolve(name, &raw_param(op, name), env, true)?
            .ok_or_else(|| invalid(name, "resolved to nothing"))
    };
    let mapper = parse_mapper(&resolve_required("mapper")?)?;
    let contigs = resolve_required("contigs")?;
    let contigs = contigs
        .as_str()
        .ok_or_else(|| invalid("contigs", "expected a path"))?
        .to_string();
    let pairs = read_pairs(&resolve_required("reads")?)?;
    let threads = resolve_required("threads")?;
    if !threads.is_i64() {
        return Err(HanaError::ParameterType {
            param: "threads".into(),
            expected: "an integer".into(),
            found: json_type_name(&threads).into(),
        });
    }
    let args = parse_args(op.param("args"))?;
    Ok(MapPlan {
        mapper,
        contigs,
        pairs,
        threads: threads.to_string(),
        args,
    })
}

fn pair_chain(
    plan: &MapPlan,
    status: &Status,
    index: Option<&str>,
    (fwd, rev): &(String, String),
    output: &str,
) -> Result<ProcessChain> {
    match plan.mapper {
        Mapper::Bwa => {
            let samtools = tool_path(status, "samtools_path")?;
            let mut mem = CommandLine::new(tool_path(status, "bwa_path")?).arg("mem");
            mem = match &plan.args {
                Some(args) => mem.args(args.iter().cloned()),
                None => mem.args(["-SP5M", "-t", plan.threads.as_str()]),
            };
            let mem = mem.args([plan.contigs.as_str(), fwd.as_str(), rev.as_str()]);
            let view = CommandLine::new(samtools).args(["view", "-hF", "256", "-"]);
            let sort = CommandLine::new(samtools).args([
                "sort",
                "-@",
                plan.threads.as_str(),
                "-o",
                output,
                "-T",
                "tmp.ali",
            ]);
            Ok(ProcessChain::single(mem).pipe(view).pipe(sort))
        }
        Mapper::Chromap => {
            let index = index.ok_or_else(|| invalid("contigs", "chromap index missing"))?;
            let chromap = CommandLine::new(tool_path(status, "chromap_path")?).args([
                "--preset",
                "hic",
                "-t",
                plan.threads.as_str(),
                "-x",
                index,
                "-r",
                plan.contigs.as_str(),
                "-1",
                fwd.as_str(),
                "-2",
                rev.as_str(),
                "-o",
                output,
            ]);
            Ok(ProcessChain::single(chromap))
        }
    }
}

#[async_trait]
impl OperationHandler for MapHandler {
    fn command(&self) -> Command {
        Command::Map
    }

    fn produces(&self) -> &[&'static str] {
        &["mappings"]
    }

    fn accepts_param(&self, name: &str) -> bool {
        PARAMS.contains(&name)
    }

    fn bindings(&self, op: &Operation<'_>) -> Vec<Binding> {
        ["contigs", "reads", "mapper", "threads"]
            .into_iter()
            .map(|name| Binding {
                name: name.to_string(),
                reference: raw_param(op, name),
                required: true,
            })
            .collect()
    }

    fn validate(
        &self,
        _path: &OperationPath,
        op: &Operation<'_>,
        env: &Environment<'_>,
    ) -> Result<()> {
        if let Some(mapper) = resolve("mapper", &raw_param(op, "mapper"), env, false)? {
            let mapper = parse_mapper(&mapper)?;
            for key in mapper.required_tools() {
                let present = env
                    .status
                    .get(*key)
                    .and_then(Value::as_str)
                    .is_some_and(|p| !p.is_empty());
                if !present {
                    return Err(HanaError::ToolNotFound {
                        tool: key.trim_end_matches("_path").to_string(),
                    });
                }
            }
        }
        parse_args(op.param("args"))?;
        Ok(())
    }

    async fn execute(
        &self,
        path: &OperationPath,
        op: &Operation<'_>,
        ctx: &mut RunContext<'_>,
    ) -> Result<Outcome> {
        let plan = plan_mapping(op, &ctx.environment())?;
        let index = self.build_index(plan.mapper, &plan.contigs, ctx).await?;

        let prefix = ctx.config().project_name().to_string();
        let mut done = finished_pairs(ctx.status(), path);
        let mut outputs = Vec::with_capacity(plan.pairs.len());

        for (i, pair) in plan.pairs.iter().enumerate() {
            let output = format!(
                "{prefix}.map{}.pairs{i}.{}",
                path.key(),
                plan.mapper.output_extension()
            );
            let finished = done.contains(&output)
                && (ctx.is_dry_run() || ctx.config().resolve_path(&output).is_file());
            if finished {
                tracing::info!(output = %output, "Read pair already mapped, skipping");
            } else {
                tracing::info!(pair = i, forward = %pair.0, reverse = %pair.1, "Mapping read pair");
                let chain = pair_chain(&plan, ctx.status(), index.as_deref(), pair, &output)?;
                ctx.invoke(chain).await?;
                ctx.check_output(&output)?;
                if !done.contains(&output) {
                    done.push(output.clone());
                }
                record_finished(ctx.status_mut(), path, &done);
                ctx.commit().await?;
            }
            outputs.push(output);
        }

        clear_finished(ctx.status_mut(), path);
        Ok(Outcome::success(format!("mapped {} read pairs", outputs.len()))
            .with_update("mappings", json!(outputs)))
    }
}
