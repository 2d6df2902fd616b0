//! Command-line driver for the LESS compiler.

use lessc_core::{ChunkLevel, Config, ImportError, Imported, Importer};
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Errors that may occur when parsing arguments.
#[derive(Debug, thiserror::Error)]
enum ArgsError {
    /// Missing the input path argument.
    #[error("missing input file argument (or '-' for stdin)")]
    Input,
    /// Extra unknown junk on the command line.
    #[error("unknown arguments: {}", _0.display())]
    Extra(std::ffi::OsString),
    /// Some other parsing error.
    #[error(transparent)]
    Pico(#[from] pico_args::Error),
}

/// Command-line arguments.
struct Args {
    /// The `.less` source to compile, or `-` for stdin.
    input: String,
    /// Where to write the compiled CSS; `None` means stdout.
    output: Option<String>,
    /// Collapse whitespace and elide redundant punctuation.
    compress: bool,
    /// Honor arithmetic operators only inside parentheses.
    strict_math: bool,
    /// Skip the chunker's comment/string/brace pre-pass.
    no_chunker: bool,
    /// Preserve `/* */` comments in the emitted CSS.
    keep_comments: bool,
}

impl Args {
    /// Tries to get an argument either from the arguments list or from an
    /// environment variable.
    fn free_arg(args: &mut pico_args::Arguments, key: &str, err: ArgsError) -> Result<String, ArgsError> {
        if let Some(arg) = args.opt_free_from_str::<String>()? {
            Ok(arg)
        } else if let Ok(arg) = std::env::var(key) {
            Ok(arg)
        } else {
            Err(err)
        }
    }

    /// Tries to create an [`Args`] from the given command line arguments and
    /// environment variables.
    fn new() -> Result<Args, ArgsError> {
        let mut args = pico_args::Arguments::from_env();
        let compress = args.contains("--compress") || args.contains("-x");
        let strict_math = args.contains("--strict-math");
        let no_chunker = args.contains("--no-chunker");
        let keep_comments = !args.contains("--strip-comments");
        let output = args.opt_value_from_str("-o")?.or(args.opt_value_from_str("--output")?);
        let input = Self::free_arg(&mut args, "LESSC_INPUT", ArgsError::Input)?;

        let rest = args.finish();
        if !rest.is_empty() {
            return Err(ArgsError::Extra(rest.join(std::ffi::OsStr::new(" "))));
        }

        Ok(Self { input, output, compress, strict_math, no_chunker, keep_comments })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [options] <input.less|-> [-o <output.css>]\n");
    eprintln!("Options:");
    eprintln!("  --compress, -x      Collapse whitespace and punctuation");
    eprintln!("  --strict-math       Honor operators only inside parentheses");
    eprintln!("  --no-chunker        Skip the comment/string/brace pre-pass");
    eprintln!("  --strip-comments    Drop ordinary comments from the output");
    eprintln!("  -o, --output <path> Write compiled CSS here (default: stdout)");
}

/// Resolves `@import` paths against the filesystem, relative to the
/// importing file's directory (or the process's current directory for the
/// entry file). Remembers every canonical path it has already read so
/// repeated imports of the same file are served from cache rather than
/// re-reading the disk.
struct FilesystemImporter {
    cache: RefCell<HashSet<PathBuf>>,
}

impl FilesystemImporter {
    fn new() -> Self {
        Self { cache: RefCell::new(HashSet::new()) }
    }

    /// Finds the file `path` resolves to, trying `.less` and then bare
    /// `.css` in turn when `path` carries no extension of its own.
    fn resolve(path: &str, current_file: Option<&str>) -> Result<PathBuf, ImportError> {
        let base = current_file.and_then(|f| Path::new(f).parent()).unwrap_or_else(|| Path::new(""));
        let candidate = base.join(path);
        if candidate.extension().is_some() {
            return Ok(candidate);
        }
        let with_less = candidate.with_extension("less");
        if with_less.is_file() {
            return Ok(with_less);
        }
        let with_css = candidate.with_extension("css");
        if with_css.is_file() {
            return Ok(with_css);
        }
        Err(ImportError(format!("could not find '{path}' as .less or .css relative to {}", base.display())))
    }
}

impl Importer for FilesystemImporter {
    fn import(&self, path: &str, current_file: Option<&str>) -> Result<Imported, ImportError> {
        let resolved = Self::resolve(path, current_file)?;
        let source = std::fs::read_to_string(&resolved).map_err(|e| ImportError(format!("{}: {e}", resolved.display())))?;
        let canonical_path = resolved.canonicalize().unwrap_or(resolved).to_string_lossy().into_owned();
        let already_imported = !self.cache.borrow_mut().insert(PathBuf::from(&canonical_path));
        Ok(Imported { source, canonical_path, already_imported })
    }
}

/// Runs the compiler end to end, returning the exit code to use.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = match Args::new() {
        Ok(args) => args,
        Err(err) => {
            usage();
            return Err(err)?;
        }
    };

    let (source, file) = if args.input == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        (source, None)
    } else {
        let source = std::fs::read_to_string(&args.input)?;
        (source, Some(args.input.clone()))
    };

    log::info!("compiling {}", file.as_deref().unwrap_or("<stdin>"));

    let importer = FilesystemImporter::new();
    let config = Config {
        compress: args.compress,
        strict_math: args.strict_math,
        optimization: if args.no_chunker { ChunkLevel::None } else { ChunkLevel::Chunked },
        keep_comments: args.keep_comments,
        importer: Some(&importer),
    };

    let css = lessc_core::compile(&source, file.as_deref(), &config)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, css)?;
            log::info!("wrote {path}");
        }
        None => {
            std::io::stdout().write_all(css.as_bytes())?;
        }
    }

    Ok(())
}

/// Uses the [`Display`](std::fmt::Display) formatter for an error even when
/// the [`Debug`](std::fmt::Debug) formatter is requested.
struct DisplayError(Box<dyn std::error::Error>);

impl std::fmt::Debug for DisplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl<E: Into<Box<dyn std::error::Error>>> From<E> for DisplayError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

fn main() -> Result<(), DisplayError> {
    run().map_err(Into::into)
}
