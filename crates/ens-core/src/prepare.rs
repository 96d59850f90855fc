//! Run directory preparation.
//!
//! The template directory is copied into the run directory, then every listed
//! template is rendered in place and its suffix dropped. With pickup enabled an
//! existing run directory is kept and only the template files are copied again.

use std::{collections::BTreeMap, ffi::OsStr, path::Path};

use ens_exec::CommandSpec;
use ens_model::{Batch, Run};
use minijinja::{Environment, UndefinedBehavior};
use tokio::fs;
use tracing::{debug, info};

use crate::{Engine, TemplatingError};

pub const TEMPLATE_SUFFIX: &str = ".j2";

/// Materialise the run directory of `run` and render its templates.
pub async fn prepare(engine: &Engine, batch: &Batch, run: &Run) -> Result<(), TemplatingError> {
    for template in &batch.templates {
        check_suffix(template)?;
    }

    let exists = fs::try_exists(&run.dir)
        .await
        .map_err(TemplatingError::io(&run.dir))?;

    if exists && engine.config().pickup {
        info!(run = %run.id, dir = %run.dir.display(), "picked up existing run directory");
        recopy_templates(batch, run).await?;
    } else {
        if exists {
            return Err(TemplatingError::DirectoryExists(run.dir.clone()));
        }
        create_run_dir(&run.dir).await?;
        copy_template_dir(engine, &batch.templatedir, &run.dir).await?;
    }

    process_templates(run, &batch.templates).await
}

fn check_suffix(template: &str) -> Result<&str, TemplatingError> {
    template
        .strip_suffix(TEMPLATE_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| TemplatingError::NotATemplate(template.to_string(), TEMPLATE_SUFFIX))
}

async fn recopy_templates(batch: &Batch, run: &Run) -> Result<(), TemplatingError> {
    for template in &batch.templates {
        let src = batch.templatedir.join(template);
        let dst = run.dir.join(template);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(TemplatingError::io(parent))?;
        }
        fs::copy(&src, &dst).await.map_err(TemplatingError::io(&src))?;
        debug!(src = %src.display(), dst = %dst.display(), "re-copied template for regeneration");
    }
    Ok(())
}

async fn create_run_dir(dir: &Path) -> Result<(), TemplatingError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o775);
    builder.create(dir).await.map_err(TemplatingError::io(dir))
}

async fn copy_template_dir(engine: &Engine, src: &Path, dst: &Path) -> Result<(), TemplatingError> {
    let spec = CommandSpec::argv("cp", [OsStr::new("-a"), src.join(".").as_os_str(), dst.as_os_str()]);
    info!(command = %spec.display(), "copying template directory");

    let copy_error = |reason: String| TemplatingError::Copy {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        reason,
    };
    let output = engine
        .exec()
        .run(&spec)
        .await
        .map_err(|e| copy_error(e.to_string()))?;
    if !output.success() {
        return Err(copy_error(format!(
            "exit {:?}: {}",
            output.code,
            output.stderr.trim()
        )));
    }
    Ok(())
}

/// Render every template of `run` against its variables.
///
/// Variables are visible both at the top level and under `run`.
pub async fn process_templates(run: &Run, templates: &[String]) -> Result<(), TemplatingError> {
    for template in templates {
        check_suffix(template)?;
    }

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    let mut context: BTreeMap<String, minijinja::Value> = run
        .vars
        .iter()
        .map(|(k, v)| (k.clone(), minijinja::Value::from_serialize(v)))
        .collect();
    context.insert("run".into(), minijinja::Value::from_serialize(&run.vars));

    for template in templates {
        let stem = check_suffix(template)?;
        let src = run.dir.join(template);
        let dst = run.dir.join(stem);
        info!(run = %run.id, src = %src.display(), dst = %dst.display(), "rendering template");

        let source = fs::read_to_string(&src)
            .await
            .map_err(TemplatingError::io(&src))?;
        let rendered = env
            .render_str(&source, &context)
            .map_err(|source| TemplatingError::Render {
                file: template.clone(),
                source,
            })?;

        let permissions = fs::metadata(&src)
            .await
            .map_err(TemplatingError::io(&src))?
            .permissions();
        fs::write(&dst, rendered)
            .await
            .map_err(TemplatingError::io(&dst))?;
        fs::set_permissions(&dst, permissions)
            .await
            .map_err(TemplatingError::io(&dst))?;
        fs::remove_file(&src)
            .await
            .map_err(TemplatingError::io(&src))?;
    }
    Ok(())
}
