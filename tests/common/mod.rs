#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use cutter::error::{Error, Result};
use cutter::prompt::Prompter;

/// One scripted answer, consumed in order.
#[derive(Debug, Clone)]
pub enum Answer {
    Text(String),
    YesNo(bool),
    Select(usize),
}

pub fn text(answer: &str) -> Answer {
    Answer::Text(answer.to_string())
}

/// Prompter double that replays scripted answers and records what it was asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<Answer>>,
    pub prompts: RefCell<Vec<String>>,
    pub notices: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self { answers: RefCell::new(answers.into()), ..Default::default() }
    }

    pub fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }

    fn next(&self, prompt: &str) -> Result<Answer> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Error::Prompt(format!("no scripted answer for '{prompt}'")))
    }
}

fn unexpected(expected: &str, prompt: &str, answer: Answer) -> Error {
    Error::Prompt(format!("expected {expected} for '{prompt}', scripted {answer:?}"))
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, skip_confirmation: bool, prompt: String) -> Result<bool> {
        if skip_confirmation {
            return Ok(true);
        }
        self.yes_no(&prompt, false)
    }

    fn text(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        match self.next(prompt)? {
            Answer::Text(answer) if answer.is_empty() => {
                Ok(default.unwrap_or_default().to_string())
            }
            Answer::Text(answer) => Ok(answer),
            other => Err(unexpected("text", prompt, other)),
        }
    }

    fn password(&self, prompt: &str) -> Result<String> {
        match self.next(prompt)? {
            Answer::Text(answer) => Ok(answer),
            other => Err(unexpected("password", prompt, other)),
        }
    }

    fn yes_no(&self, prompt: &str, _default: bool) -> Result<bool> {
        match self.next(prompt)? {
            Answer::YesNo(answer) => Ok(answer),
            other => Err(unexpected("yes/no", prompt, other)),
        }
    }

    fn select(&self, prompt: &str, _items: &[String], _default: usize) -> Result<usize> {
        match self.next(prompt)? {
            Answer::Select(index) => Ok(index),
            other => Err(unexpected("a selection", prompt, other)),
        }
    }

    fn notify(&self, message: &str) {
        self.notices.borrow_mut().push(message.to_string());
    }
}

/// Writes a template: `cookiecutter.json` plus files relative to `root`.
pub fn write_template(root: &Path, manifest: &str, files: &[(&str, &str)]) -> PathBuf {
    fs::create_dir_all(root).unwrap();
    fs::write(root.join("cookiecutter.json"), manifest).unwrap();
    for (path, content) in files {
        let target = root.join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }
    root.to_path_buf()
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}
