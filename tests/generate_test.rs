mod common;

use std::fs;
use std::path::Path;

use common::write_template;
use cutter::context::Context;
use cutter::error::Error;
use cutter::generate::{find_template_dir, GenerateOptions, TreeRenderer};
use cutter::renderer::MiniJinjaRenderer;
use serde_json::{json, Value};
use tempfile::TempDir;

fn context(value: Value) -> Context {
    value.as_object().cloned().unwrap()
}

fn render(
    template: &Path,
    context: &Context,
    output: &Path,
) -> cutter::error::Result<std::path::PathBuf> {
    let engine = MiniJinjaRenderer::new();
    TreeRenderer::new(&engine, GenerateOptions::default()).render(template, context, output)
}

#[test]
fn test_renders_names_and_contents() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[
            ("{{cookiecutter.slug}}/README.md", "# {{ cookiecutter.name }}\n"),
            (
                "{{cookiecutter.slug}}/{{cookiecutter.slug}}/__init__.py",
                "VERSION = \"{{ cookiecutter.version }}\"\n",
            ),
        ],
    );
    let output = tmp.path().join("out");
    let ctx = context(json!({"name": "Demo", "slug": "demo", "version": "0.1.0"}));

    let project = render(&template, &ctx, &output).unwrap();
    assert_eq!(project, output.join("demo"));
    assert_eq!(fs::read_to_string(project.join("README.md")).unwrap(), "# Demo\n");
    assert_eq!(
        fs::read_to_string(project.join("demo/__init__.py")).unwrap(),
        "VERSION = \"0.1.0\"\n"
    );
}

#[test]
fn test_non_templated_project_dir_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let template =
        write_template(&tmp.path().join("template"), "{}", &[("myproject/README.md", "hi")]);
    let result = render(&template, &Context::new(), &tmp.path().join("out"));
    assert!(matches!(result, Err(Error::NonTemplatedInputDir { .. })));
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn test_project_dir_discovery() {
    let tmp = TempDir::new().unwrap();
    let root = write_template(
        tmp.path(),
        "{}",
        &[
            ("{{cookiecutter.slug}}/a.txt", ""),
            ("hooks/pre_gen_project.sh", ""),
            ("docs/index.md", ""),
        ],
    );
    assert_eq!(find_template_dir(&root).unwrap(), root.join("{{cookiecutter.slug}}"));

    fs::create_dir(root.join("{{cookiecutter.other}}")).unwrap();
    assert!(matches!(find_template_dir(&root), Err(Error::AmbiguousTemplateDir { .. })));

    let empty = TempDir::new().unwrap();
    assert!(matches!(find_template_dir(empty.path()), Err(Error::TemplateDirNotFound { .. })));
}

#[test]
fn test_binary_files_are_copied_verbatim() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[("{{cookiecutter.slug}}/keep.txt", "")],
    );
    let png: Vec<u8> =
        vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, b'{', b'{', b' ', b'x'];
    fs::write(template.join("{{cookiecutter.slug}}/logo.png"), &png).unwrap();

    let ctx = context(json!({"slug": "demo"}));
    let project = render(&template, &ctx, &tmp.path().join("out")).unwrap();
    assert_eq!(fs::read(project.join("logo.png")).unwrap(), png);
}

#[test]
fn test_copy_without_render() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[
            ("{{cookiecutter.slug}}/rendered.txt", "{{ cookiecutter.slug }}"),
            ("{{cookiecutter.slug}}/raw.html", "{{ not rendered }}"),
            ("{{cookiecutter.slug}}/{{cookiecutter.slug}}-assets/app.js", "{{ also raw }}"),
        ],
    );
    let ctx = context(json!({
        "slug": "demo",
        "_copy_without_render": ["*.html", "*-assets"],
    }));

    let project = render(&template, &ctx, &tmp.path().join("out")).unwrap();
    assert_eq!(fs::read_to_string(project.join("rendered.txt")).unwrap(), "demo");
    assert_eq!(fs::read_to_string(project.join("raw.html")).unwrap(), "{{ not rendered }}");
    assert_eq!(
        fs::read_to_string(project.join("demo-assets/app.js")).unwrap(),
        "{{ also raw }}"
    );
}

#[cfg(unix)]
#[test]
fn test_copy_without_render_directory_over_existing_output() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[
            ("{{cookiecutter.slug}}/static/app.js", "{{ raw }}"),
            ("{{cookiecutter.slug}}/static/{{ raw }}.txt", "raw name"),
        ],
    );
    std::os::unix::fs::symlink("app.js", template.join("{{cookiecutter.slug}}/static/current"))
        .unwrap();
    let ctx = context(json!({"slug": "demo", "_copy_without_render": ["static"]}));
    let output = tmp.path().join("out");

    let project = render(&template, &ctx, &output).unwrap();
    assert_eq!(fs::read_to_string(project.join("static/{{ raw }}.txt")).unwrap(), "raw name");
    fs::write(project.join("static/app.js"), "edited").unwrap();

    // Existing links are replaced on a plain re-run.
    render(&template, &ctx, &output).unwrap();
    assert_eq!(fs::read_to_string(project.join("static/app.js")).unwrap(), "{{ raw }}");
    assert_eq!(fs::read_link(project.join("static/current")).unwrap(), Path::new("app.js"));

    fs::write(project.join("static/app.js"), "edited").unwrap();
    let engine = MiniJinjaRenderer::new();
    TreeRenderer::new(&engine, GenerateOptions { skip_if_file_exists: true })
        .render(&template, &ctx, &output)
        .unwrap();
    assert_eq!(fs::read_to_string(project.join("static/app.js")).unwrap(), "edited");
    assert_eq!(fs::read_link(project.join("static/current")).unwrap(), Path::new("app.js"));
}

#[test]
fn test_empty_rendered_names_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[
            (
                "{{cookiecutter.slug}}/{% if cookiecutter.docker %}Dockerfile{% endif %}",
                "FROM scratch\n",
            ),
            (
                "{{cookiecutter.slug}}/{% if cookiecutter.docker %}docker{% endif %}/compose.yml",
                "services: {}\n",
            ),
            ("{{cookiecutter.slug}}/README.md", "readme\n"),
        ],
    );
    let ctx = context(json!({"slug": "demo", "docker": false}));
    let project = render(&template, &ctx, &tmp.path().join("out")).unwrap();

    let mut entries: Vec<String> = fs::read_dir(&project)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["README.md"]);
}

#[test]
fn test_newlines_follow_source_or_setting() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[
            ("{{cookiecutter.slug}}/dos.txt", "a\r\nb\r\n"),
            ("{{cookiecutter.slug}}/unix.txt", "a\nb\n"),
        ],
    );

    let keep = context(json!({"slug": "keep"}));
    let project = render(&template, &keep, &tmp.path().join("out")).unwrap();
    assert_eq!(fs::read(project.join("dos.txt")).unwrap(), b"a\r\nb\r\n");
    assert_eq!(fs::read(project.join("unix.txt")).unwrap(), b"a\nb\n");

    let forced = context(json!({"slug": "forced", "_new_lines": "\r\n"}));
    let project = render(&template, &forced, &tmp.path().join("out")).unwrap();
    assert_eq!(fs::read(project.join("unix.txt")).unwrap(), b"a\r\nb\r\n");
}

#[test]
fn test_render_errors_name_the_file() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[("{{cookiecutter.slug}}/src/broken.py", "ok\n{% if %}\n")],
    );
    match render(&template, &context(json!({"slug": "demo"})), &tmp.path().join("out")) {
        Err(Error::TemplateSyntax { path, line, .. }) => {
            assert_eq!(path, "src/broken.py");
            assert_eq!(line, 2);
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }

    let template = write_template(
        &tmp.path().join("template2"),
        "{}",
        &[("{{cookiecutter.slug}}/undefined.txt", "{{ cookiecutter.missing }}")],
    );
    assert!(matches!(
        render(&template, &context(json!({"slug": "demo"})), &tmp.path().join("out2")),
        Err(Error::Render { .. })
    ));
}

#[test]
fn test_skip_if_file_exists() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[("{{cookiecutter.slug}}/a.txt", "new a"), ("{{cookiecutter.slug}}/b.txt", "new b")],
    );
    let output = tmp.path().join("out");
    fs::create_dir_all(output.join("demo")).unwrap();
    fs::write(output.join("demo/a.txt"), "edited a").unwrap();

    let engine = MiniJinjaRenderer::new();
    TreeRenderer::new(&engine, GenerateOptions { skip_if_file_exists: true })
        .render(&template, &context(json!({"slug": "demo"})), &output)
        .unwrap();
    assert_eq!(fs::read_to_string(output.join("demo/a.txt")).unwrap(), "edited a");
    assert_eq!(fs::read_to_string(output.join("demo/b.txt")).unwrap(), "new b");
}

#[test]
fn test_generation_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[
            (
                "{{cookiecutter.slug}}/src/{{cookiecutter.slug}}.rs",
                "pub const NAME: &str = \"{{ cookiecutter.slug }}\";\n",
            ),
            ("{{cookiecutter.slug}}/Cargo.toml", "[package]\nname = \"{{ cookiecutter.slug }}\"\n"),
        ],
    );
    let ctx = context(json!({"slug": "demo"}));
    render(&template, &ctx, &tmp.path().join("first")).unwrap();
    render(&template, &ctx, &tmp.path().join("second")).unwrap();
    assert!(!dir_diff::is_different(tmp.path().join("first"), tmp.path().join("second")).unwrap());
}

#[cfg(unix)]
#[test]
fn test_permissions_and_symlinks() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let template = write_template(
        &tmp.path().join("template"),
        "{}",
        &[("{{cookiecutter.slug}}/run.sh", "#!/bin/sh\necho {{ cookiecutter.slug }}\n")],
    );
    common::set_mode(&template.join("{{cookiecutter.slug}}/run.sh"), 0o755);
    let link = template.join("{{cookiecutter.slug}}/current");
    std::os::unix::fs::symlink("{{cookiecutter.slug}}.txt", link).unwrap();

    let ctx = context(json!({"slug": "demo"}));
    let project = render(&template, &ctx, &tmp.path().join("out")).unwrap();
    let mode = fs::metadata(project.join("run.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
    assert_eq!(fs::read_link(project.join("current")).unwrap(), Path::new("demo.txt"));
}
