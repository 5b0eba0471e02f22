// wholebody_core/src/signal.rs

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::trace;

use crate::error::SignalError;
use crate::types::{Generation, Tick};

/// Callback producing the value of a signal for a given tick. Used both for
/// the plug of an input signal and for the compute function of a dependent
/// signal.
pub type Producer<T> = Box<dyn FnMut(Tick) -> Result<T, SignalError>>;

/// Invalidation epoch shared by every signal of one entity.
///
/// Cache validity is keyed by `(tick, generation)`: bumping the counter makes
/// every cached value in the graph stale at once, which is how re-plugging an
/// input or replacing the model invalidates downstream caches without walking
/// edges.
#[derive(Clone, Debug, Default)]
pub struct GenerationCounter(Rc<Cell<Generation>>);

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn current(&self) -> Generation {
        self.0.get()
    }
}

/// The two kinds of port, dispatched on at read time.
enum Variant<T> {
    /// Plugged to an upstream producer; pulls on demand.
    Input { plug: Option<Producer<T>> },
    /// Computed by a callback once every declared upstream is up to date.
    /// The upstream list is fixed at construction.
    Dependent {
        upstream: Vec<SignalHandle>,
        compute: Producer<T>,
    },
}

struct CacheSlot<T> {
    key: Option<(Tick, Generation)>,
    value: Option<T>,
}

/// Shared state of one signal. Single-threaded by design (spec'd scheduling
/// is cooperative within one tick), hence `Rc`/`Cell` rather than sync types.
struct SignalCore<T> {
    name: String,
    generation: GenerationCounter,
    cache: RefCell<CacheSlot<T>>,
    /// Set while this signal is being evaluated; a read that finds it set has
    /// followed a dependency cycle.
    in_progress: Cell<bool>,
    variant: RefCell<Variant<T>>,
}

impl<T: Clone> SignalCore<T> {
    fn cached(&self, tick: Tick, generation: Generation) -> Option<T> {
        let slot = self.cache.borrow();
        if slot.key == Some((tick, generation)) {
            slot.value.clone()
        } else {
            None
        }
    }

    fn read(&self, tick: Tick) -> Result<T, SignalError> {
        if self.in_progress.get() {
            return Err(SignalError::Cycle(self.name.clone()));
        }
        let generation = self.generation.current();
        if let Some(value) = self.cached(tick, generation) {
            return Ok(value);
        }

        trace!("recomputing '{}' at tick {}", self.name, tick);
        self.in_progress.set(true);
        let result = self.recompute(tick);
        self.in_progress.set(false);

        // The cache is written only on success: a failing callback leaves the
        // previous value and cache key untouched.
        let value = result?;
        *self.cache.borrow_mut() = CacheSlot {
            key: Some((tick, generation)),
            value: Some(value.clone()),
        };
        Ok(value)
    }

    fn recompute(&self, tick: Tick) -> Result<T, SignalError> {
        // Bring every declared upstream to the requested tick first. The
        // handles are cloned out so no borrow is held while descending.
        let upstream: Vec<SignalHandle> = match &*self.variant.borrow() {
            Variant::Dependent { upstream, .. } => upstream.clone(),
            Variant::Input { .. } => Vec::new(),
        };
        for dependency in &upstream {
            dependency.sync(tick)?;
        }

        let mut variant = self.variant.borrow_mut();
        match &mut *variant {
            Variant::Input { plug: Some(producer) } => producer(tick),
            Variant::Input { plug: None } => Err(SignalError::Unplugged(self.name.clone())),
            Variant::Dependent { compute, .. } => compute(tick),
        }
    }
}

/// Type-erased view of a signal, enough to declare it as a dependency.
pub trait SignalBase {
    /// Fully qualified name, `<entity>::<direction>(<typeTag>)::<port>`.
    fn name(&self) -> &str;

    /// Brings the signal up to `tick`, recomputing if needed, discarding the
    /// value.
    fn sync(&self, tick: Tick) -> Result<(), SignalError>;
}

pub type SignalHandle = Rc<dyn SignalBase>;

impl<T: Clone + 'static> SignalBase for SignalCore<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, tick: Tick) -> Result<(), SignalError> {
        self.read(tick).map(|_| ())
    }
}

/// A named, typed port carrying a value stamped with an integer tick.
///
/// Reading at a tick returns the cached value if the cache key matches
/// `(tick, generation)` exactly; any other key (including a *later* tick)
/// triggers recomputation after the declared upstreams have been brought to
/// the same tick. Handles are cheap to clone and share one core.
pub struct Signal<T>(Rc<SignalCore<T>>);

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// An input port. Fails with [`SignalError::Unplugged`] until a producer
    /// is plugged.
    pub fn input(name: impl Into<String>, generation: &GenerationCounter) -> Self {
        Self(Rc::new(SignalCore {
            name: name.into(),
            generation: generation.clone(),
            cache: RefCell::new(CacheSlot { key: None, value: None }),
            in_progress: Cell::new(false),
            variant: RefCell::new(Variant::Input { plug: None }),
        }))
    }

    /// A dependent output port. The upstream list is immutable after
    /// construction; `compute` runs only once they are all up to date.
    pub fn dependent(
        name: impl Into<String>,
        generation: &GenerationCounter,
        upstream: Vec<SignalHandle>,
        compute: Producer<T>,
    ) -> Self {
        Self(Rc::new(SignalCore {
            name: name.into(),
            generation: generation.clone(),
            cache: RefCell::new(CacheSlot { key: None, value: None }),
            in_progress: Cell::new(false),
            variant: RefCell::new(Variant::Dependent { upstream, compute }),
        }))
    }

    /// Returns the value associated with `tick`, recomputing if the cache key
    /// differs from `(tick, current generation)`.
    pub fn read(&self, tick: Tick) -> Result<T, SignalError> {
        self.0.read(tick)
    }

    /// Rebinds the producer of an input signal and bumps the generation
    /// counter so every downstream cache goes stale.
    ///
    /// # Panics
    /// If called on a dependent signal; dependencies are fixed at
    /// construction.
    pub fn plug(&self, producer: Producer<T>) {
        let mut variant = self.0.variant.borrow_mut();
        match &mut *variant {
            Variant::Input { plug } => *plug = Some(producer),
            Variant::Dependent { .. } => {
                panic!("signal '{}' is not an input signal", self.0.name)
            }
        }
        self.0.generation.bump();
    }

    /// Plugs a producer that returns the same value at every tick.
    pub fn plug_value(&self, value: T) {
        self.plug(Box::new(move |_| Ok(value.clone())));
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Type-erased handle, for declaring this signal as an upstream.
    pub fn handle(&self) -> SignalHandle {
        let core: Rc<SignalCore<T>> = Rc::clone(&self.0);
        core
    }
}
