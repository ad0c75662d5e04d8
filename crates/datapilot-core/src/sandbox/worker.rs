use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rustpython_vm as vm;
use rustpython_vm::builtins::PyBaseException;
use rustpython_vm::scope::Scope;
use rustpython_vm::{Interpreter, InterpreterBuilder};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::figure::{FigureSpec, RenderedFigure, render_svg};
use super::{ExecutionOutcome, SandboxError, shim};
use crate::datasets::DatasetBinding;

/// Instructions for binding one dataset inside the context.
#[derive(Debug, Clone)]
pub struct BindingSpec {
    pub var_name: String,
    pub path_var_name: String,
    pub source_path: String,
    pub json_path: String,
}

enum SandboxCommand {
    Init {
        response: oneshot::Sender<Result<(), SandboxError>>,
    },
    Bind {
        specs: Vec<BindingSpec>,
        response: oneshot::Sender<Result<(), SandboxError>>,
    },
    Execute {
        code: String,
        timeout: Duration,
        response: oneshot::Sender<Result<ExecutionOutcome, SandboxError>>,
    },
    GetVariable {
        name: String,
        response: oneshot::Sender<Option<String>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Async-side handle to one session's execution context.
///
/// The context lives on its own OS thread; dropping the handle leaves the
/// thread to drain and exit once the channel closes.
#[derive(Clone)]
pub struct SandboxHandle {
    sender: mpsc::UnboundedSender<SandboxCommand>,
    session_dir: Arc<TempDir>,
}

impl SandboxHandle {
    /// Spawn the worker thread for a fresh context. The interpreter itself is
    /// built lazily by [`SandboxHandle::initialize`].
    pub fn spawn() -> Result<Self, SandboxError> {
        let session_dir = TempDir::new()
            .map_err(|e| SandboxError::Startup(format!("session dir: {e}")))?;
        let worker_dir = session_dir.path().to_path_buf();
        let (sender, receiver) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name("datapilot-sandbox".to_owned())
            .spawn(move || worker_loop(receiver, worker_dir))
            .map_err(|e| SandboxError::Startup(format!("worker thread: {e}")))?;

        Ok(Self {
            sender,
            session_dir: Arc::new(session_dir),
        })
    }

    pub fn session_dir(&self) -> &Path {
        self.session_dir.path()
    }

    /// Build the interpreter and run the bootstrap shims.
    pub async fn initialize(&self) -> Result<(), SandboxError> {
        let (tx, rx) = oneshot::channel();
        self.send(SandboxCommand::Init { response: tx })?;
        rx.await.map_err(Self::worker_gone)?
    }

    /// Materialize dataset bindings inside the context. Tables are written as
    /// JSON into the session directory and loaded by the Frame shim.
    pub async fn bind_datasets(&self, bindings: &[DatasetBinding]) -> Result<(), SandboxError> {
        let mut specs = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let json_path = self.session_dir().join(format!("{}.json", binding.name));
            let payload = serde_json::to_vec(&binding.table.to_json())
                .map_err(|e| SandboxError::Init(format!("serialize {}: {e}", binding.name)))?;
            std::fs::write(&json_path, payload)
                .map_err(|e| SandboxError::Init(format!("write {}: {e}", binding.name)))?;
            specs.push(BindingSpec {
                var_name: binding.var_name.clone(),
                path_var_name: binding.path_var_name.clone(),
                source_path: binding.table.path.display().to_string(),
                json_path: json_path.display().to_string(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.send(SandboxCommand::Bind {
            specs,
            response: tx,
        })?;
        rx.await.map_err(Self::worker_gone)?
    }

    /// Run one fragment against the persistent namespace.
    pub async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let (tx, rx) = oneshot::channel();
        self.send(SandboxCommand::Execute {
            code: code.to_owned(),
            timeout,
            response: tx,
        })?;
        rx.await.map_err(Self::worker_gone)?
    }

    /// repr() of a namespace variable, for diagnostics and tests.
    pub async fn get_variable(&self, name: &str) -> Result<Option<String>, SandboxError> {
        let (tx, rx) = oneshot::channel();
        self.send(SandboxCommand::GetVariable {
            name: name.to_owned(),
            response: tx,
        })?;
        rx.await.map_err(Self::worker_gone)
    }

    pub async fn shutdown(&self) -> Result<(), SandboxError> {
        let (tx, rx) = oneshot::channel();
        self.send(SandboxCommand::Shutdown { response: tx })?;
        rx.await.map_err(Self::worker_gone)
    }

    fn send(&self, command: SandboxCommand) -> Result<(), SandboxError> {
        self.sender
            .send(command)
            .map_err(|_| SandboxError::ContextLost("worker channel closed".to_string()))
    }

    fn worker_gone<E>(_: E) -> SandboxError {
        SandboxError::ContextLost("worker dropped response".to_string())
    }
}

fn worker_loop(mut receiver: mpsc::UnboundedReceiver<SandboxCommand>, session_dir: PathBuf) {
    let mut core = SandboxCore {
        env: None,
        session_dir,
    };
    while let Some(command) = receiver.blocking_recv() {
        match command {
            SandboxCommand::Init { response } => {
                let _ = response.send(core.init());
            }
            SandboxCommand::Bind { specs, response } => {
                let _ = response.send(core.bind(&specs));
            }
            SandboxCommand::Execute {
                code,
                timeout,
                response,
            } => {
                let _ = response.send(core.execute(&code, timeout));
            }
            SandboxCommand::GetVariable { name, response } => {
                let _ = response.send(core.get_variable(&name));
            }
            SandboxCommand::Shutdown { response } => {
                let _ = response.send(());
                break;
            }
        }
    }
    debug!(target: "sandbox", "worker thread exiting");
}

struct SandboxCore {
    env: Option<SandboxEnv>,
    session_dir: PathBuf,
}

impl SandboxCore {
    fn init(&mut self) -> Result<(), SandboxError> {
        let env = SandboxEnv::new(&self.session_dir)?;
        self.env = Some(env);
        Ok(())
    }

    fn bind(&mut self, specs: &[BindingSpec]) -> Result<(), SandboxError> {
        let env = self
            .env
            .as_mut()
            .ok_or_else(|| SandboxError::ContextLost("context not initialized".to_string()))?;
        env.bind(specs)
    }

    fn execute(&mut self, code: &str, timeout: Duration) -> Result<ExecutionOutcome, SandboxError> {
        let env = self
            .env
            .as_mut()
            .ok_or_else(|| SandboxError::ContextLost("context not initialized".to_string()))?;
        Ok(env.execute(code, timeout))
    }

    fn get_variable(&self, name: &str) -> Option<String> {
        self.env.as_ref().and_then(|env| env.get_variable(name))
    }
}

struct SandboxEnv {
    interpreter: Interpreter,
    scope: Scope,
    figure_sink: Arc<Mutex<Vec<String>>>,
    figure_seq: u64,
}

impl SandboxEnv {
    fn new(session_dir: &Path) -> Result<Self, SandboxError> {
        let builder = InterpreterBuilder::new();
        let interpreter = init_stdlib(builder).interpreter();

        let scope = interpreter
            .enter(|vm: &vm::VirtualMachine| {
                let scope = vm.new_scope_with_builtins();
                Ok(scope)
            })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                SandboxError::Startup(format!("scope init: {err:?}"))
            })?;

        let figure_sink: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = figure_sink.clone();
        let session_dir_str = session_dir.to_string_lossy().to_string();
        let bootstrap_scope = scope.clone();
        interpreter
            .enter(move |vm: &vm::VirtualMachine| -> vm::PyResult<()> {
                bootstrap_scope.globals.set_item(
                    "__dp_session_dir",
                    vm.ctx.new_str(session_dir_str.as_str()).into(),
                    vm,
                )?;

                let emit_fn = vm.new_function(
                    "__dp_emit_figure",
                    move |payload: String| -> vm::PyResult<()> {
                        if let Ok(mut pending) = sink.lock() {
                            pending.push(payload);
                        }
                        Ok(())
                    },
                );
                bootstrap_scope
                    .globals
                    .set_item("__dp_emit_figure", emit_fn.into(), vm)?;

                for (label, code) in shim::INIT_SEGMENTS {
                    vm.run_string(
                        bootstrap_scope.clone(),
                        code,
                        format!("<bootstrap_{label}>"),
                    )?;
                }
                Ok(())
            })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                SandboxError::Init(format!("bootstrap: {err:?}"))
            })?;

        Ok(Self {
            interpreter,
            scope,
            figure_sink,
            figure_seq: 0,
        })
    }

    fn bind(&mut self, specs: &[BindingSpec]) -> Result<(), SandboxError> {
        let scope = self.scope.clone();
        self.interpreter
            .enter(move |vm: &vm::VirtualMachine| -> vm::PyResult<()> {
                for spec in specs {
                    scope.globals.set_item(
                        "__dp_json_path",
                        vm.ctx.new_str(spec.json_path.as_str()).into(),
                        vm,
                    )?;
                    scope.globals.set_item(
                        spec.path_var_name.as_str(),
                        vm.ctx.new_str(spec.source_path.as_str()).into(),
                        vm,
                    )?;
                    let loader = format!("{} = __dp_load_frame(__dp_json_path)\n", spec.var_name);
                    vm.run_string(scope.clone(), &loader, format!("<bind_{}>", spec.var_name))?;
                }
                Ok(())
            })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                SandboxError::Init(format!("dataset binding: {err:?}"))
            })
    }

    fn execute(&mut self, code: &str, timeout: Duration) -> ExecutionOutcome {
        if let Ok(mut pending) = self.figure_sink.lock() {
            pending.clear();
        }

        let start = Instant::now();
        let scope = self.scope.clone();
        let mut success = false;
        let mut timed_out = false;

        let enter_result = self
            .interpreter
            .enter(|vm: &vm::VirtualMachine| -> vm::PyResult<(String, String)> {
                let preamble = shim::preamble(timeout.as_secs_f64());
                vm.run_string(scope.clone(), &preamble, "<sandbox_preamble>".to_owned())?;

                match vm.run_string(scope.clone(), code, "<fragment>".to_owned()) {
                    Ok(_) => {
                        success = true;
                    }
                    Err(exc) => {
                        timed_out = exc.class().name().to_string() == "TimeoutError";
                        // Traceback lands in the redirected stderr.
                        vm.print_exception(exc);
                    }
                }

                vm.run_string(scope.clone(), shim::POSTAMBLE, "<sandbox_postamble>".to_owned())?;

                let stdout = get_string_global(vm, &scope, "__dp_stdout_value");
                let stderr = get_string_global(vm, &scope, "__dp_stderr_value");
                Ok((stdout, stderr))
            });

        let (stdout, stderr) = match enter_result {
            Ok(streams) => streams,
            Err(err) => {
                warn!(target: "sandbox", "prologue/epilogue failed: {err:?}");
                return ExecutionOutcome {
                    stdout: String::new(),
                    error: Some(format!("internal execution failure: {err:?}")),
                    figures: self.drain_figures(),
                    success: false,
                    duration: start.elapsed(),
                };
            }
        };

        let error = if timed_out {
            Some(format!(
                "Execution timed out after {} seconds",
                timeout.as_secs()
            ))
        } else if !success {
            Some(stderr)
        } else if stderr.is_empty() {
            None
        } else {
            Some(stderr)
        };

        ExecutionOutcome {
            stdout,
            error,
            figures: self.drain_figures(),
            success,
            duration: start.elapsed(),
        }
    }

    // Drains pending figure specs in emission order, assigning the
    // session-monotonic sequence numbers.
    fn drain_figures(&mut self) -> Vec<RenderedFigure> {
        let payloads: Vec<String> = match self.figure_sink.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        payloads
            .iter()
            .filter_map(|payload| match serde_json::from_str::<FigureSpec>(payload) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    warn!(target: "sandbox", "discarding malformed figure payload: {e}");
                    None
                }
            })
            .map(|spec| {
                let figure = RenderedFigure {
                    sequence: self.figure_seq,
                    svg: render_svg(&spec),
                };
                self.figure_seq += 1;
                figure
            })
            .collect()
    }

    fn get_variable(&self, name: &str) -> Option<String> {
        let scope = self.scope.clone();
        self.interpreter
            .enter(|vm: &vm::VirtualMachine| -> vm::PyResult<Option<String>> {
                let Ok(value) = scope.globals.get_item(name, vm) else {
                    return Ok(None);
                };
                let text = match value.str(vm) {
                    Ok(py_str) => py_str.as_str().to_owned(),
                    Err(_) => value.repr(vm)?.as_str().to_owned(),
                };
                Ok(Some(text))
            })
            .ok()
            .flatten()
    }
}

fn init_stdlib(builder: InterpreterBuilder) -> InterpreterBuilder {
    let defs = rustpython_stdlib::stdlib_module_defs(&builder.ctx);
    builder
        .add_native_modules(&defs)
        .add_frozen_modules(rustpython_pylib::FROZEN_STDLIB)
        .init_hook(set_frozen_stdlib_dir)
}

#[allow(clippy::expect_used)]
fn set_frozen_stdlib_dir(vm: &mut vm::VirtualMachine) {
    use rustpython_vm::common::rc::PyRc;

    let state = PyRc::get_mut(&mut vm.state).expect("vm state");
    state.config.paths.stdlib_dir = Some(rustpython_pylib::LIB_PATH.to_owned());
}

fn get_string_global(vm: &vm::VirtualMachine, scope: &Scope, name: &str) -> String {
    scope
        .globals
        .get_item(name, vm)
        .ok()
        .and_then(|value| value.try_to_value::<String>(vm).ok())
        .unwrap_or_default()
}
