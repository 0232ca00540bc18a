//! Argument construction macros.

/// Build a [`NamedArgs`](crate::models::NamedArgs) from `name: value` pairs.
///
/// Values go through `Into<SqlValue>`, so literals, strings and `Option`s work
/// directly; `None` becomes NULL.
///
/// # Example
///
/// ```
/// use dbscope::named_args;
///
/// let args = named_args! { id: 7, name: "ann", nickname: None::<String> };
/// assert_eq!(args.len(), 3);
/// assert!(!args.is_set("nickname"));
/// ```
#[macro_export]
macro_rules! named_args {
    () => {
        $crate::models::NamedArgs::new()
    };
    ($($name:ident : $value:expr),+ $(,)?) => {{
        let mut args = $crate::models::NamedArgs::new();
        $(
            args.insert(stringify!($name), $value);
        )+
        args
    }};
}
