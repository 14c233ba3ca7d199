use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::{CommandError, CommandRunner};

type Responder = fn(&[String], &str) -> Result<String, CommandError>;

/// Records invocations and answers from a canned function.
pub(crate) struct ScriptedRunner {
    pub(crate) calls: Mutex<Vec<(PathBuf, Vec<String>, String)>>,
    respond: Responder,
}

impl ScriptedRunner {
    pub(crate) fn new(respond: Responder) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond,
        })
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        input: &str,
    ) -> Result<String, CommandError> {
        self.calls
            .lock()
            .expect("lock")
            .push((program.to_path_buf(), args.to_vec(), input.to_string()));
        (self.respond)(args, input)
    }
}
