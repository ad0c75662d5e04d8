//! Python bootstrap sources installed into every new execution context.
//!
//! The segments run once at init, in order, against the session scope:
//! builtin capture, the import/open allowlists, the Frame table class, and
//! the plotting facade whose `show()` is the figure interception point.

/// Labelled so a failing segment is identifiable in the startup error.
pub(super) const INIT_SEGMENTS: &[(&str, &str)] = &[
    (
        "builtins_ref",
        r#"__dp_builtins = __builtins__
if isinstance(__dp_builtins, dict):
    def __dp_get_builtin(name):
        return __dp_builtins.get(name)
else:
    def __dp_get_builtin(name):
        return getattr(__dp_builtins, name, None)
"#,
    ),
    (
        "safe_list",
        r#"__dp_safe_builtin_names = [
    "print", "len", "str", "int", "float", "list", "dict", "set", "tuple", "bool",
    "type", "isinstance", "issubclass", "enumerate", "zip", "map", "filter", "sorted",
    "min", "max", "sum", "abs", "round", "repr", "format", "range", "reversed",
    "iter", "next", "pow", "divmod", "any", "all", "hasattr", "getattr", "setattr",
    "delattr", "dir", "vars", "slice", "hash", "id", "callable", "object", "super",
    "property", "staticmethod", "classmethod", "complex", "bytes", "bytearray",
    "BaseException", "Exception", "ArithmeticError", "ZeroDivisionError", "ValueError",
    "TypeError", "KeyError", "IndexError", "AttributeError", "NameError", "LookupError",
    "RuntimeError", "NotImplementedError", "AssertionError", "StopIteration",
    "GeneratorExit", "ImportError", "OSError", "IOError", "FileNotFoundError",
    "PermissionError", "TimeoutError", "Warning", "UserWarning", "DeprecationWarning",
]"#,
    ),
    (
        "safe_builtins",
        r#"__dp_safe_builtins = {}
for __dp_name in __dp_safe_builtin_names:
    __dp_value = __dp_get_builtin(__dp_name)
    if __dp_value is not None:
        __dp_safe_builtins[__dp_name] = __dp_value
for __dp_name in ["input", "eval", "exec", "compile", "globals", "locals"]:
    __dp_safe_builtins[__dp_name] = None
"#,
    ),
    (
        "safe_imports",
        r#"__dp_allowed_modules = {
    "json", "math", "statistics", "random", "re", "itertools", "functools",
    "collections", "datetime", "decimal", "fractions", "string", "bisect",
    "heapq", "io", "sys", "time",
}
__dp_import_builtin = __dp_get_builtin('__import__')
def __dp_safe_import(name, globals=None, locals=None, fromlist=(), level=0, _import=__dp_import_builtin):
    root = name.split('.')[0]
    if root not in __dp_allowed_modules:
        raise ImportError(f"import of '{root}' is blocked")
    return _import(name, globals, locals, fromlist, level)
"#,
    ),
    (
        "safe_open",
        r#"__dp_open_builtin = __dp_get_builtin('open')
def __dp_safe_open(path, *args, _import=__dp_import_builtin, _open=__dp_open_builtin, _root=__dp_session_dir, **kwargs):
    __dp_os = _import('os')
    root = __dp_os.path.abspath(_root)
    p = str(path)
    if not __dp_os.path.isabs(p):
        p = __dp_os.path.join(root, p)
    p = __dp_os.path.abspath(p)
    if not (p == root or p.startswith(root + __dp_os.sep)):
        raise PermissionError('open restricted to the session directory')
    return _open(p, *args, **kwargs)
"#,
    ),
    (
        "builtins_assign",
        r#"__dp_safe_builtins['__import__'] = __dp_safe_import
__dp_safe_builtins['open'] = __dp_safe_open
__builtins__ = __dp_safe_builtins
"#,
    ),
    (
        "frame_class",
        r#"import json as __dp_json

class Frame:
    """Lightweight column-oriented table bound into the session."""

    def __init__(self, columns, rows):
        self.columns = list(columns)
        self.rows = [list(r) for r in rows]

    def __len__(self):
        return len(self.rows)

    @property
    def shape(self):
        return (len(self.rows), len(self.columns))

    def col(self, name):
        i = self.columns.index(name)
        return [r[i] for r in self.rows]

    def head(self, n=5):
        return Frame(self.columns, self.rows[:n])

    def records(self):
        return [dict(zip(self.columns, r)) for r in self.rows]

    def __repr__(self):
        lines = [" | ".join(str(c) for c in self.columns)]
        for r in self.rows[:10]:
            lines.append(" | ".join("" if v is None else str(v) for v in r))
        if len(self.rows) > 10:
            lines.append(f"... ({len(self.rows)} rows)")
        return "\n".join(lines)


def __dp_load_frame(path):
    with open(path, 'r') as f:
        data = __dp_json.load(f)
    return Frame(data['columns'], data['rows'])
"#,
    ),
    (
        "plotting",
        r#"class _Figure:
    def __init__(self):
        self.title = None
        self.xlabel = None
        self.ylabel = None
        self.series = []


class _Plotting:
    """pyplot-flavoured facade; show() hands the figure to the sink."""

    def __init__(self):
        self._current = _Figure()

    def figure(self, *args, **kwargs):
        self._current = _Figure()

    def _xy(self, x, y):
        if y is None:
            ys = [float(v) for v in x]
            xs = [float(i) for i in range(len(ys))]
        else:
            xs = [float(v) for v in x]
            ys = [float(v) for v in y]
        return xs, ys

    def plot(self, x, y=None, label=None, **kwargs):
        xs, ys = self._xy(x, y)
        self._current.series.append({"kind": "line", "x": xs, "y": ys, "label": label})

    def scatter(self, x, y, label=None, **kwargs):
        xs, ys = self._xy(x, y)
        self._current.series.append({"kind": "scatter", "x": xs, "y": ys, "label": label})

    def bar(self, x, height, label=None, **kwargs):
        self._current.series.append({
            "kind": "bar",
            "labels": [str(v) for v in x],
            "y": [float(v) for v in height],
            "label": label,
        })

    def hist(self, values, bins=10, label=None, **kwargs):
        self._current.series.append({
            "kind": "hist",
            "values": [float(v) for v in values if v is not None],
            "bins": int(bins),
            "label": label,
        })

    def title(self, text):
        self._current.title = str(text)

    def xlabel(self, text):
        self._current.xlabel = str(text)

    def ylabel(self, text):
        self._current.ylabel = str(text)

    def legend(self, *args, **kwargs):
        pass

    def show(self, *args, **kwargs):
        fig = self._current
        payload = {
            "title": fig.title,
            "xlabel": fig.xlabel,
            "ylabel": fig.ylabel,
            "series": fig.series,
        }
        __dp_emit_figure(__dp_json.dumps(payload))
        self._current = _Figure()


plt = _Plotting()
"#,
    ),
];

/// Per-fragment prologue: redirect stdio, arm the wall-clock deadline.
pub(super) fn preamble(budget_secs: f64) -> String {
    format!(
        r#"import io, sys, time
__dp_old_stdout = sys.stdout
__dp_old_stderr = sys.stderr
__dp_stdout = io.StringIO()
__dp_stderr = io.StringIO()
sys.stdout = __dp_stdout
sys.stderr = __dp_stderr
__dp_deadline = time.time() + {budget_secs}

def __dp_trace(frame, event, arg):
    if time.time() > __dp_deadline:
        raise TimeoutError('code execution exceeded time limit')
    return __dp_trace

sys.settrace(__dp_trace)
"#
    )
}

/// Per-fragment epilogue: always runs, restoring stdio and the trace hook.
pub(super) const POSTAMBLE: &str = r#"import sys
sys.settrace(None)
sys.stdout = __dp_old_stdout
sys.stderr = __dp_old_stderr
__dp_stdout_value = __dp_stdout.getvalue()
__dp_stderr_value = __dp_stderr.getvalue()
"#;
