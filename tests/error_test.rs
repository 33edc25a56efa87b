use std::io;
use std::path::PathBuf;

use cutter::error::Error;

#[test]
fn test_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::IoError(_)));

    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::JsonError(_)));
}

#[test]
fn test_error_display() {
    let err = Error::Config("invalid config".to_string());
    assert_eq!(err.to_string(), "Configuration error: invalid config.");

    let err = Error::TemplateSyntax {
        path: "README.md".to_string(),
        line: 3,
        message: "unexpected end".to_string(),
    };
    assert_eq!(err.to_string(), "Template syntax error in 'README.md' at line 3: unexpected end.");

    let err = Error::NonTemplatedInputDir { dir: PathBuf::from("template/project") };
    assert_eq!(err.to_string(), "The project directory 'template/project' is not templated.");
}

#[test]
fn test_repository_not_found_lists_locations() {
    let err = Error::RepositoryNotFound {
        template: "demo".to_string(),
        tried: vec!["demo".to_string(), "/cache/demo".to_string()],
    };
    assert_eq!(
        err.to_string(),
        "A valid repository for \"demo\" could not be found \
         in the following locations: demo, /cache/demo."
    );
}
