//! Callee-side dispatch table.
//!
//! A function name is bound at registration time to a target object and a
//! statically typed method. Argument count and types are checked once, at the
//! call boundary, and a mismatch becomes a [`DispatchError`].
//!
//! ```rust,ignore
//! struct Lamp { on: AtomicBool }
//!
//! impl Lamp {
//!     fn toggle(&self) -> String { /* ... */ }
//!     fn dim(&self, level: u8) -> Result<u8, String> { /* ... */ }
//! }
//!
//! let lamp = Arc::new(Lamp::default());
//! table.bind("toggle", lamp.clone(), Lamp::toggle);
//! table.bind("dim", lamp, Lamp::dim);
//! ```

use crate::error::DispatchError;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

/// Conversion of a method's return value into a call result.
///
/// Implemented for `Result<T, E>` (an `Err` is a target-side failure) and for
/// common plain values, which always succeed.
pub trait IntoCallResult {
    fn into_call_result(self) -> Result<Value, DispatchError>;
}

fn to_result_value<T: Serialize>(value: T) -> Result<Value, DispatchError> {
    serde_json::to_value(value)
        .map_err(|e| DispatchError::Failed(format!("Result could not be serialized: {}", e)))
}

impl<T: Serialize, E: Display> IntoCallResult for Result<T, E> {
    fn into_call_result(self) -> Result<Value, DispatchError> {
        match self {
            Ok(value) => to_result_value(value),
            Err(e) => Err(DispatchError::Failed(e.to_string())),
        }
    }
}

impl<T: Serialize> IntoCallResult for Option<T> {
    fn into_call_result(self) -> Result<Value, DispatchError> {
        to_result_value(self)
    }
}

impl<T: Serialize> IntoCallResult for Vec<T> {
    fn into_call_result(self) -> Result<Value, DispatchError> {
        to_result_value(self)
    }
}

macro_rules! plain_call_result {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoCallResult for $ty {
                fn into_call_result(self) -> Result<Value, DispatchError> {
                    to_result_value(self)
                }
            }
        )*
    };
}

plain_call_result!(
    (),
    bool,
    String,
    &'static str,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    Value,
);

/// A method of `T` taking the positional argument types `Args`.
///
/// Implemented for any `Fn(&T, A1, .., An) -> R` with up to six arguments,
/// where each `Ai` is deserializable and `R: IntoCallResult`.
pub trait Method<T, Args>: Send + Sync + 'static {
    fn invoke(&self, target: &T, args: Vec<Value>) -> Result<Value, DispatchError>;
}

fn take_arg<A: DeserializeOwned>(
    args: &mut std::iter::Enumerate<std::vec::IntoIter<Value>>,
    expected: usize,
) -> Result<A, DispatchError> {
    let (index, value) = args.next().ok_or(DispatchError::ArgumentCount {
        expected,
        actual: 0,
    })?;
    serde_json::from_value(value).map_err(|e| DispatchError::ArgumentType {
        index,
        message: e.to_string(),
    })
}

macro_rules! impl_method {
    ($($arg:ident),*) => {
        impl<T, F, R, $($arg,)*> Method<T, ($($arg,)*)> for F
        where
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: IntoCallResult,
            $($arg: DeserializeOwned,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn invoke(&self, target: &T, args: Vec<Value>) -> Result<Value, DispatchError> {
                let expected = <[&str]>::len(&[$(stringify!($arg)),*]);
                if args.len() != expected {
                    return Err(DispatchError::ArgumentCount {
                        expected,
                        actual: args.len(),
                    });
                }
                let mut args = args.into_iter().enumerate();
                $(let $arg: $arg = take_arg(&mut args, expected)?;)*
                (self)(target, $($arg),*).into_call_result()
            }
        }
    };
}

impl_method!();
impl_method!(A1);
impl_method!(A1, A2);
impl_method!(A1, A2, A3);
impl_method!(A1, A2, A3, A4);
impl_method!(A1, A2, A3, A4, A5);
impl_method!(A1, A2, A3, A4, A5, A6);

/// An invocable entry in the dispatch table: `(argList) -> result`.
pub trait RemoteFunction: Send + Sync + 'static {
    fn call(&self, args: Vec<Value>) -> Result<Value, DispatchError>;
}

impl<F> RemoteFunction for F
where
    F: Fn(Vec<Value>) -> Result<Value, DispatchError> + Send + Sync + 'static,
{
    fn call(&self, args: Vec<Value>) -> Result<Value, DispatchError> {
        (self)(args)
    }
}

/// A method bound to the object it runs against.
pub struct BoundMethod<T, M, Args> {
    target: Arc<T>,
    method: M,
    _args: PhantomData<fn() -> Args>,
}

impl<T, M, Args> BoundMethod<T, M, Args> {
    pub fn new(target: Arc<T>, method: M) -> Self {
        Self {
            target,
            method,
            _args: PhantomData,
        }
    }
}

impl<T, M, Args> RemoteFunction for BoundMethod<T, M, Args>
where
    T: Send + Sync + 'static,
    M: Method<T, Args>,
    Args: 'static,
{
    fn call(&self, args: Vec<Value>) -> Result<Value, DispatchError> {
        self.method.invoke(&self.target, args)
    }
}

/// Function name to bound function.
///
/// Safe for lookups that race with late registrations.
#[derive(Default)]
pub struct FunctionTable {
    functions: DashMap<String, Arc<dyn RemoteFunction>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `method` on `target`. Returns `true` if an earlier
    /// binding was replaced.
    pub fn bind<T, M, Args>(&self, name: &str, target: Arc<T>, method: M) -> bool
    where
        T: Send + Sync + 'static,
        M: Method<T, Args>,
        Args: 'static,
    {
        self.insert(name, Arc::new(BoundMethod::new(target, method)))
    }

    /// Bind `name` to an untyped function. Returns `true` on replacement.
    pub fn insert(&self, name: &str, function: Arc<dyn RemoteFunction>) -> bool {
        self.functions.insert(name.to_string(), function).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RemoteFunction>> {
        self.functions.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Run `name` with `args` on the blocking pool.
    ///
    /// A panic inside the target is caught and reported, never propagated.
    pub async fn dispatch(&self, name: &str, args: Vec<Value>) -> Result<Value, DispatchError> {
        let function = self
            .get(name)
            .ok_or_else(|| DispatchError::FunctionNotFound(name.to_string()))?;

        match tokio::task::spawn_blocking(move || function.call(args)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(DispatchError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(DispatchError::Panicked(e.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "target panicked".to_string()
    }
}
