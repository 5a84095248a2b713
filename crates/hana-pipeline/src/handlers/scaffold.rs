use async_trait::async_trait;
use serde_json::{json, Value};

use hana_tools::{CommandLine, ProcessChain};
use hana_types::{HanaError, OperationPath, Outcome, Result, Status};
use hana_vars::strip_extension;

use crate::context::RunContext;
use crate::enzyme::canonicalize_enzyme;
use crate::handler::OperationHandler;
use crate::operation::{Command, Operation};
use crate::params::ValueKind::{Bool, Float, Int, Str, StrList};
use crate::params::{BoundParams, ParamSpec, ToolSchema};

// ---------------------------------------------------------------------------
// Parameter tables
// ---------------------------------------------------------------------------

const EXTRACT: ToolSchema = ToolSchema {
    defaults: &[
        ("contigs", "$"),
        ("mappings", "$"),
        ("allele", "$"),
        ("output", "#PROJECT_DIR"),
        ("enzyme", "!"),
        ("threads", "!"),
        ("mapq", "!"),
    ],
    params: &[
        ParamSpec::new("contigs", "-f", Str).required(),
        ParamSpec::new("mappings", "-m", StrList).required(),
        ParamSpec::new("allele", "-a", Str),
        ParamSpec::new("output", "-o", Str).required(),
        ParamSpec::new("threads", "-t", Int),
        ParamSpec::new("enzyme", "-e", Str)
            .required()
            .validated(canonicalize_enzyme),
        ParamSpec::new("enzyme_range", "-r", Int),
        ParamSpec::new("mapq", "-q", Int),
        ParamSpec::new("search-buffer", "--search-buffer", Int),
        ParamSpec::new("mapping-buffer", "--mapping-buffer", Int),
        ParamSpec::new("skip-check-flag", "--no-flag", Bool),
        ParamSpec::new("skip-check-range", "--no-range", Bool),
    ],
};

const DRAFT: ToolSchema = ToolSchema {
    defaults: &[
        ("nodes", "-"),
        ("reads", "-"),
        ("output", "#PROJECT_DIR"),
        ("allele", "-"),
    ],
    params: &[
        ParamSpec::new("nodes", "-n", Str).required(),
        ParamSpec::new("reads", "-r", Str).required(),
        ParamSpec::new("allele", "-a", Str),
        ParamSpec::new("output", "-o", Str).required(),
        ParamSpec::new("buffer-size", "-b", Int),
        ParamSpec::new("min-links", "--min-links", Int),
        ParamSpec::new("min-re", "--min-re", Int),
        ParamSpec::new("max-link-density", "--max-link-density", Float),
    ],
};

const PARTITION: ToolSchema = ToolSchema {
    defaults: &[
        ("nodes", "-"),
        ("edges", "-"),
        ("output", "#PROJECT_DIR"),
        ("groups", "!"),
    ],
    params: &[
        ParamSpec::new("nodes", "-n", Str).required(),
        ParamSpec::new("edges", "-e", Str).required(),
        ParamSpec::new("allele", "-a", Str),
        ParamSpec::new("groups", "-g", Int).required(),
        ParamSpec::new("output", "-o", Str).required(),
        ParamSpec::new("buffer-size", "-b", Int),
        ParamSpec::new("non-informative-ratio", "--non-informative-ratio", Int),
    ],
};

const ORDERING: ToolSchema = ToolSchema {
    defaults: &[
        ("nodes", "-"),
        ("edges", "-"),
        ("group", "-"),
        ("output", "[+][base]-group,.hmr_seq"),
        ("threads", "!"),
    ],
    params: &[
        ParamSpec::new("nodes", "-n", Str).required(),
        ParamSpec::new("edges", "-e", Str).required(),
        ParamSpec::new("group", "-g", Str).required(),
        ParamSpec::new("output", "-o", Str).required(),
        ParamSpec::new("threads", "-t", Int),
        ParamSpec::new("buffer-size", "-b", Int),
        ParamSpec::new("seed", "-s", Int),
        ParamSpec::new("mutate-prob", "--mutapb", Float),
        ParamSpec::new("non-change-gen", "--ngen", Int),
        ParamSpec::new("max-gen", "--max-gen", Int),
        ParamSpec::new("num-of-pop", "--npop", Int),
    ],
};

const ORIENTATION: ToolSchema = ToolSchema {
    defaults: &[("nodes", "-"), ("reads", "-"), ("seq", "-")],
    params: &[
        ParamSpec::new("nodes", "-n", Str).required(),
        ParamSpec::new("reads", "-r", Str).required(),
        ParamSpec::new("seq", "-s", StrList).required(),
        ParamSpec::new("buffer-size", "-b", Int),
    ],
};

const BUILD: ToolSchema = ToolSchema {
    defaults: &[("contigs", "$"), ("chromo", "-"), ("output", "#PROJECT_DIR")],
    params: &[
        ParamSpec::new("contigs", "-f", Str).required(),
        ParamSpec::new("chromo", "-c", StrList).required(),
        ParamSpec::new("output", "-o", Str).required(),
    ],
};

// ---------------------------------------------------------------------------
// Published results
// ---------------------------------------------------------------------------

/// Status values to publish and the files that must exist for them.
struct Products {
    outcome: Outcome,
    files: Vec<String>,
}

type PublishFn = fn(&BoundParams, &Status) -> Result<Products>;

fn bound_str<'p>(params: &'p BoundParams, name: &str) -> Result<&'p str> {
    params.get_str(name).ok_or_else(|| HanaError::InvalidValue {
        param: name.to_string(),
        message: "was not bound".into(),
    })
}

fn bound_list(params: &BoundParams, name: &str) -> Result<Vec<String>> {
    let items = params
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| HanaError::InvalidValue {
            param: name.to_string(),
            message: "was not bound".into(),
        })?;
    Ok(items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}

fn publish_extract(params: &BoundParams, _status: &Status) -> Result<Products> {
    let output = bound_str(params, "output")?;
    let mut outcome = Outcome::success("extracted");
    let mut files = Vec::new();
    let mut publish = |key: &str, suffix: &str| {
        let file = format!("{output}{suffix}");
        outcome.status_updates.insert(key.into(), json!(file));
        files.push(file);
    };
    publish("nodes", ".hmr_nodes");
    publish("reads", ".hmr_reads");
    if params.contains("allele") {
        publish("allele", ".hmr_allele_table");
    }
    Ok(Products { outcome, files })
}

fn publish_draft(params: &BoundParams, _status: &Status) -> Result<Products> {
    let edges = format!("{}.hmr_edges", bound_str(params, "output")?);
    Ok(Products {
        outcome: Outcome::success("drafted").with_update("edges", json!(edges)),
        files: vec![edges],
    })
}

fn publish_partition(params: &BoundParams, _status: &Status) -> Result<Products> {
    let output = bound_str(params, "output")?;
    let count = params
        .get("groups")
        .and_then(Value::as_i64)
        .ok_or_else(|| HanaError::InvalidValue {
            param: "groups".into(),
            message: "was not bound".into(),
        })?;
    let groups: Vec<String> = (1..=count)
        .map(|i| format!("{output}_{i}g{count}.hmr_group"))
        .collect();
    Ok(Products {
        outcome: Outcome::success(format!("partitioned into {count} groups"))
            .with_update("groups", json!(groups)),
        files: groups,
    })
}

fn publish_ordering(params: &BoundParams, status: &Status) -> Result<Products> {
    let output = bound_str(params, "output")?.to_string();
    let mut seq = match status.get("seq") {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(HanaError::InvalidValue {
                param: "seq".into(),
                message: "status value 'seq' is corrupted, expected a list".into(),
            })
        }
    };
    let entry = json!(output);
    if !seq.contains(&entry) {
        seq.push(entry);
    }
    Ok(Products {
        outcome: Outcome::success("ordered").with_update("seq", Value::Array(seq)),
        files: vec![output],
    })
}

fn publish_orientation(params: &BoundParams, _status: &Status) -> Result<Products> {
    let chromo: Vec<String> = bound_list(params, "seq")?
        .iter()
        .map(|seq| format!("{}.hmr_chromo", strip_extension(seq)))
        .collect();
    Ok(Products {
        outcome: Outcome::success("oriented").with_update("chromo", json!(chromo)),
        files: chromo,
    })
}

fn publish_nothing(_params: &BoundParams, _status: &Status) -> Result<Products> {
    Ok(Products {
        outcome: Outcome::success("built"),
        files: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// ScaffoldHandler
// ---------------------------------------------------------------------------

/// Runs one of the `hana_<command>` scaffolding binaries with table-bound
/// parameters, then checks and publishes its outputs.
pub struct ScaffoldHandler {
    command: Command,
    schema: ToolSchema,
    produces: &'static [&'static str],
    publish: PublishFn,
}

impl ScaffoldHandler {
    pub fn extract() -> Self {
        Self {
            command: Command::Extract,
            schema: EXTRACT,
            produces: &["nodes", "reads", "allele"],
            publish: publish_extract,
        }
    }

    pub fn draft() -> Self {
        Self {
            command: Command::Draft,
            schema: DRAFT,
            produces: &["edges"],
            publish: publish_draft,
        }
    }

    pub fn partition() -> Self {
        Self {
            command: Command::Partition,
            schema: PARTITION,
            produces: &["groups"],
            publish: publish_partition,
        }
    }

    pub fn ordering() -> Self {
        Self {
            command: Command::Ordering,
            schema: ORDERING,
            produces: &["seq"],
            publish: publish_ordering,
        }
    }

    pub fn orientation() -> Self {
        Self {
            command: Command::Orientation,
            schema: ORIENTATION,
            produces: &["chromo"],
            publish: publish_orientation,
        }
    }

    pub fn build() -> Self {
        Self {
            command: Command::Build,
            schema: BUILD,
            produces: &[],
            publish: publish_nothing,
        }
    }
}

#[async_trait]
impl OperationHandler for ScaffoldHandler {
    fn command(&self) -> Command {
        self.command
    }

    fn schema(&self) -> Option<&ToolSchema> {
        Some(&self.schema)
    }

    fn produces(&self) -> &[&'static str] {
        self.produces
    }

    async fn execute(
        &self,
        path: &OperationPath,
        op: &Operation<'_>,
        ctx: &mut RunContext<'_>,
    ) -> Result<Outcome> {
        tracing::info!(path = %path, command = %self.command, "Configuring operation");
        let params = self.schema.bind(op, &ctx.environment())?;
        let program = ctx.hana_binary(self.command)?;
        let command = CommandLine::new(program).args(params.to_args());

        ctx.invoke(ProcessChain::single(command)).await?;

        let products = (self.publish)(&params, ctx.status())?;
        for file in &products.files {
            ctx.check_output(file)?;
        }
        Ok(products.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(schema: &ToolSchema, raw: Value, status: Value) -> BoundParams {
        let obj = |v: Value| v.as_object().cloned().unwrap_or_default();
        let files = obj(json!({"contigs": "c.fa", "mappings": ["a.bam"]}));
        let settings = obj(json!({"threads": 2, "mapq": 40, "enzyme": "MboI", "groups": 3}));
        let attributes = obj(json!({"project_dir": "proj", "project_path": "/p/proj"}));
        let status = obj(status);
        let env = hana_vars::Environment {
            files: &files,
            settings: &settings,
            attributes: &attributes,
            status: &status,
        };
        let op = Operation::parse(&OperationPath::from(vec![0]), &raw).unwrap();
        schema.bind(&op, &env).unwrap()
    }

    #[test]
    fn extract_defaults_produce_full_command() {
        let params = bound(&EXTRACT, json!({"command": "extract"}), json!({}));
        assert_eq!(
            params.to_args(),
            vec![
                "-f", "c.fa", "-m", "a.bam", "-o", "proj", "-t", "2", "-e", "GATC", "-q", "40"
            ]
        );
        let products = publish_extract(&params, &Status::new()).unwrap();
        assert_eq!(products.files, vec!["proj.hmr_nodes", "proj.hmr_reads"]);
    }

    #[test]
    fn extract_with_allele_publishes_table() {
        let params = bound(
            &EXTRACT,
            json!({"command": "extract", "allele": "a.ctg.table"}),
            json!({}),
        );
        let products = publish_extract(&params, &Status::new()).unwrap();
        assert_eq!(
            products.outcome.status_updates.get("allele"),
            Some(&json!("proj.hmr_allele_table"))
        );
    }

    #[test]
    fn partition_lists_every_group() {
        let params = bound(
            &PARTITION,
            json!({"command": "partition"}),
            json!({"nodes": "proj.hmr_nodes", "edges": "proj.hmr_edges"}),
        );
        let products = publish_partition(&params, &Status::new()).unwrap();
        assert_eq!(
            products.files,
            vec![
                "proj_1g3.hmr_group",
                "proj_2g3.hmr_group",
                "proj_3g3.hmr_group"
            ]
        );
    }

    #[test]
    fn ordering_output_derives_from_group() {
        let params = bound(
            &ORDERING,
            json!({"command": "ordering"}),
            json!({"nodes": "n", "edges": "e", "group": "out/proj_1g3.hmr_group"}),
        );
        assert_eq!(params.get_str("output"), Some("out/proj_1g3.hmr_seq"));

        let mut status = Status::new();
        status.set("seq", json!(["out/proj_1g3.hmr_seq", "other.hmr_seq"]));
        let products = publish_ordering(&params, &status).unwrap();
        assert_eq!(
            products.outcome.status_updates.get("seq"),
            Some(&json!(["out/proj_1g3.hmr_seq", "other.hmr_seq"]))
        );
    }

    #[test]
    fn ordering_rejects_corrupted_seq() {
        let params = bound(
            &ORDERING,
            json!({"command": "ordering", "output": "x.hmr_seq"}),
            json!({"nodes": "n", "edges": "e", "group": "g"}),
        );
        let mut status = Status::new();
        status.set("seq", json!("x.hmr_seq"));
        assert!(publish_ordering(&params, &status).is_err());
    }

    #[test]
    fn orientation_maps_seq_to_chromo() {
        let params = bound(
            &ORIENTATION,
            json!({"command": "orientation"}),
            json!({"nodes": "n", "reads": "r", "seq": ["a.hmr_seq", "dir/b.hmr_seq"]}),
        );
        let products = publish_orientation(&params, &Status::new()).unwrap();
        assert_eq!(products.files, vec!["a.hmr_chromo", "dir/b.hmr_chromo"]);
        assert_eq!(
            params.to_args(),
            vec!["-n", "n", "-r", "r", "-s", "a.hmr_seq", "dir/b.hmr_seq"]
        );
    }

    #[test]
    fn build_has_no_products() {
        let params = bound(
            &BUILD,
            json!({"command": "build"}),
            json!({"chromo": ["a.hmr_chromo"]}),
        );
        assert_eq!(
            params.to_args(),
            vec!["-f", "c.fa", "-c", "a.hmr_chromo", "-o", "proj"]
        );
        assert!(publish_nothing(&params, &Status::new()).unwrap().files.is_empty());
    }
}
