//! Canonical logging macros
//!
//! Every event carries `component`, `op` and `event` fields so captured or
//! shipped logs can be filtered per operation.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use rungs::log_op_start;
/// log_op_start!("install");
/// log_op_start!("install", target_version = 5);
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use rungs::log_op_end;
/// log_op_end!("install", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// `$err` is any rungs error exposing `kind()`.
///
/// # Example
///
/// ```
/// # use rungs::log_op_error;
/// # use rungs::errors::StoreError;
/// let err = StoreError::VersionRowCount { table: "version".to_string(), affected: 0 };
/// log_op_error!("install", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let kind: $crate::errors::ErrorKind = $err.kind();
        $crate::tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?kind,
            err.code = kind.code(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let kind: $crate::errors::ErrorKind = $err.kind();
        $crate::tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?kind,
            err.code = kind.code(),
            $($field)*
        );
    }};
}
