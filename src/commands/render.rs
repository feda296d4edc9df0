use anyhow::{Context as AnyhowContext, Result};
use scaffold::RenderedPlugin;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::RenderArgs;
use crate::commands::validate;
use crate::engine::build_plan;
use crate::ui;

pub fn run(ctx: &Context, args: RenderArgs) -> Result<()> {
    let config = validate::load_validated(ctx)?;
    let plan = build_plan(&config.resources, &config.deploy, args.target.as_deref(), false)?;
    let selected: Vec<String> = plan.resources.iter().map(|r| r.id()).collect();
    let options = config.deploy.render_options();

    let mut written = 0;
    for descriptor in config.resources.iter().filter(|d| selected.contains(&d.name)) {
        let plugin = scaffold::render(descriptor, &options)
            .with_context(|| format!("Failed to render {}", descriptor.name))?;
        let paths = write_plugin(&args.out, &plugin)?;
        if !ctx.quiet {
            ui::success(&format!("{} → {}", descriptor.name, plugin.package));
            for path in &paths {
                ui::dim(&path.display().to_string());
            }
        }
        written += 1;
    }

    if !ctx.quiet {
        println!();
        ui::info(&format!(
            "Rendered {written} plugin(s) into {}",
            args.out.display()
        ));
    }
    Ok(())
}

/// Write one plugin's files under `out/<package>/`
pub fn write_plugin(out: &Path, plugin: &RenderedPlugin) -> Result<Vec<PathBuf>> {
    let dir = out.join(&plugin.package);
    plugin
        .files()
        .into_iter()
        .map(|file| {
            let path = dir.join(file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, &file.content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaffold::{DataType, FieldSpec, RenderOptions, ResourceDescriptor};
    use tempfile::TempDir;

    #[test]
    fn test_write_plugin_layout() {
        let dir = TempDir::new().unwrap();
        let descriptor =
            ResourceDescriptor::new("job_offers").with_field(FieldSpec::new("title", DataType::String));
        let plugin = scaffold::render(&descriptor, &RenderOptions::default()).unwrap();

        let paths = write_plugin(dir.path(), &plugin).unwrap();

        let root = dir.path().join("@nocodeploy/plugin-job-offers");
        assert_eq!(
            paths,
            vec![
                root.join("package.json"),
                root.join("src/server/index.js"),
                root.join("src/client/index.js"),
            ]
        );
        let manifest = fs::read_to_string(root.join("package.json")).unwrap();
        assert_eq!(manifest, plugin.manifest);
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let descriptor =
            ResourceDescriptor::new("skills").with_field(FieldSpec::new("name", DataType::String));
        let plugin = scaffold::render(&descriptor, &RenderOptions::default()).unwrap();

        let paths = write_plugin(dir.path(), &plugin).unwrap();
        let first: Vec<Vec<u8>> = paths.iter().map(|p| fs::read(p).unwrap()).collect();
        let again = scaffold::render(&descriptor, &RenderOptions::default()).unwrap();
        write_plugin(dir.path(), &again).unwrap();
        let second: Vec<Vec<u8>> = paths.iter().map(|p| fs::read(p).unwrap()).collect();
        assert_eq!(first, second);
    }
}
