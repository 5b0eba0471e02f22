// wholebody_core/src/entity.rs

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info};

use crate::configuration::ConfigurationAdapter;
use crate::engine::{DynamicsEngine, ModelLoader};
use crate::error::SignalError;
use crate::model::{Data, Model};
use crate::signal::{GenerationCounter, Signal, SignalHandle};
use crate::types::{Matrix, Tick, Vector};

/// Engine, loader and the model/data pair, shared by every signal callback of
/// one entity. Not a process-wide singleton: two entities coexist with
/// distinct models.
pub(crate) struct RobotState {
    pub(crate) engine: Box<dyn DynamicsEngine>,
    pub(crate) loader: Box<dyn ModelLoader>,
    // `data` is declared before `model`: it may reference model quantities
    // and must drop first.
    pub(crate) data: Option<Data>,
    pub(crate) model: Option<Model>,
    pub(crate) urdf_path: Option<PathBuf>,
}

impl RobotState {
    pub(crate) fn new(engine: Box<dyn DynamicsEngine>, loader: Box<dyn ModelLoader>) -> Self {
        Self {
            engine,
            loader,
            data: None,
            model: None,
            urdf_path: None,
        }
    }

    /// The loaded model, or `InvalidModel` naming the requesting signal.
    pub(crate) fn model_or(&self, signal: &str) -> Result<&Model, SignalError> {
        self.model
            .as_ref()
            .ok_or_else(|| SignalError::InvalidModel(signal.to_owned()))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
    Intern,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::Intern => "intern",
        };
        f.write_str(text)
    }
}

/// Fully qualified signal name, `sotDynamic(<entity>)::<dir>(<tag>)::<port>`.
fn qualified(entity: &str, direction: Direction, tag: &str, port: &str) -> String {
    format!("sotDynamic({entity})::{direction}({tag})::{port}")
}

/// A dynamic output: depends on the Newton-Euler driver and copies one
/// quantity out of the freshly populated workspace.
fn dynamic_output<T: Clone + 'static>(
    entity: &str,
    tag: &str,
    port: &str,
    generation: &GenerationCounter,
    driver: &Signal<Tick>,
    state: &Rc<RefCell<RobotState>>,
    extract: impl Fn(&Model, &Data) -> T + 'static,
) -> Signal<T> {
    let name = qualified(entity, Direction::Output, tag, port);
    let driver = driver.clone();
    let state = Rc::clone(state);
    let own_name = name.clone();
    Signal::dependent(
        name,
        generation,
        vec![driver.handle()],
        Box::new(move |tick| {
            // Already up to date after the dependency sync; kept explicit so
            // the callback is correct on its own.
            driver.read(tick)?;
            let guard = state.borrow();
            let model = guard.model_or(&own_name)?;
            let data = guard
                .data
                .as_ref()
                .ok_or_else(|| SignalError::InvalidModel(own_name.clone()))?;
            Ok(extract(model, data))
        }),
    )
}

/// A static output: tick-independent model fact, no driver dependency.
fn static_output<T: Clone + 'static>(
    entity: &str,
    tag: &str,
    port: &str,
    generation: &GenerationCounter,
    state: &Rc<RefCell<RobotState>>,
    extract: impl Fn(&Model) -> T + 'static,
) -> Signal<T> {
    let name = qualified(entity, Direction::Output, tag, port);
    let state = Rc::clone(state);
    let own_name = name.clone();
    Signal::dependent(
        name,
        generation,
        Vec::new(),
        Box::new(move |_tick| {
            let guard = state.borrow();
            let model = guard.model_or(&own_name)?;
            Ok(extract(model))
        }),
    )
}

/// One rigid-body-dynamics entity of the dataflow graph.
///
/// Input ports carry the external configuration representation (joint
/// vectors plus a 6-scalar free-flyer block); output ports publish derived
/// kinematic and dynamic quantities. All dynamic outputs share a single
/// Newton-Euler pass per tick through the internal driver signal.
///
/// Evaluation is single-threaded: a host reading from several threads must
/// serialize access to the entity, and must quiesce it before calling
/// [`DynamicEntity::set_urdf_path`].
pub struct DynamicEntity {
    name: String,
    generation: GenerationCounter,
    state: Rc<RefCell<RobotState>>,
    /// Registration order, kept for introspection and display.
    registered: Vec<SignalHandle>,

    // --- Input ports ---
    /// Actuated joint positions, length `nq - 7`.
    pub joint_position: Signal<Vector>,
    /// Free-flyer position: `x, y, z, roll, pitch, yaw`.
    pub free_flyer_position: Signal<Vector>,
    /// Actuated joint velocities, length `nv - 6`.
    pub joint_velocity: Signal<Vector>,
    /// Free-flyer twist, translational then angular, in the model's declared
    /// convention.
    pub free_flyer_velocity: Signal<Vector>,
    pub joint_acceleration: Signal<Vector>,
    pub free_flyer_acceleration: Signal<Vector>,

    /// Shared upstream of every dynamic output: one Newton-Euler pass per
    /// tick, populating the engine workspace.
    newton_euler: Signal<Tick>,

    // --- Dynamic outputs ---
    pub zmp: Signal<Vector>,
    pub com: Signal<Vector>,
    pub jcom: Signal<Matrix>,
    pub foot_height: Signal<f64>,
    pub inertia: Signal<Matrix>,
    pub inertia_real: Signal<Matrix>,
    pub momenta: Signal<Vector>,
    pub angular_momentum: Signal<Vector>,
    pub dynamic_drift: Signal<Vector>,

    // --- Static outputs (model facts) ---
    pub upper_joint_limits: Signal<Vector>,
    pub lower_joint_limits: Signal<Vector>,
    pub upper_velocity_limits: Signal<Vector>,
    pub lower_velocity_limits: Signal<Vector>,
    pub upper_torque_limits: Signal<Vector>,
    pub lower_torque_limits: Signal<Vector>,
    pub inertia_rotor: Signal<Vector>,
    pub gear_ratio: Signal<Vector>,
}

impl DynamicEntity {
    /// Wires and registers every signal. No model is required yet; every
    /// output fails with `InvalidModel` until [`Self::set_urdf_path`]
    /// succeeds.
    pub fn new(
        name: impl Into<String>,
        engine: Box<dyn DynamicsEngine>,
        loader: Box<dyn ModelLoader>,
    ) -> Self {
        let name = name.into();
        let generation = GenerationCounter::new();
        let state = Rc::new(RefCell::new(RobotState::new(engine, loader)));

        let input =
            |port: &str| Signal::<Vector>::input(qualified(&name, Direction::Input, "vector", port), &generation);
        let joint_position = input("position");
        let free_flyer_position = input("ffposition");
        let joint_velocity = input("velocity");
        let free_flyer_velocity = input("ffvelocity");
        let joint_acceleration = input("acceleration");
        let free_flyer_acceleration = input("ffacceleration");

        let adapter = ConfigurationAdapter::new(
            Rc::clone(&state),
            joint_position.clone(),
            free_flyer_position.clone(),
            joint_velocity.clone(),
            free_flyer_velocity.clone(),
            joint_acceleration.clone(),
            free_flyer_acceleration.clone(),
        );

        // The driver declares no upstream (invalidation rides on the
        // generation counter); it pulls q, v, a through the adapter exactly
        // once, then runs every engine pass so the workspace is consistent
        // with this tick before any output callback looks at it.
        let newton_euler = {
            let driver_name = qualified(&name, Direction::Intern, "dummy", "newtoneuler");
            let own_name = driver_name.clone();
            let state = Rc::clone(&state);
            let adapter = adapter.clone();
            Signal::dependent(
                driver_name,
                &generation,
                Vec::new(),
                Box::new(move |tick| {
                    let q = adapter.internal_position(tick)?;
                    let v = adapter.internal_velocity(tick)?;
                    let a = adapter.internal_acceleration(tick)?;

                    let mut guard = state.borrow_mut();
                    let RobotState {
                        engine, data, model, ..
                    } = &mut *guard;
                    let model = model
                        .as_ref()
                        .ok_or_else(|| SignalError::InvalidModel(own_name.clone()))?;
                    let data = data
                        .as_mut()
                        .ok_or_else(|| SignalError::InvalidModel(own_name.clone()))?;

                    data.q.copy_from(&q);
                    data.v.copy_from(&v);
                    data.a.copy_from(&a);
                    engine.inverse_dynamics(model, data, &q, &v, &a)?;
                    engine.crba(model, data, &q)?;
                    engine.centroidal_momentum(model, data, &q, &v)?;
                    engine.bias_forces(model, data, &q, &v)?;
                    Ok(tick)
                }),
            )
        };

        let dynamic = |tag: &str, port: &str, extract: Box<dyn Fn(&Model, &Data) -> Vector>| {
            dynamic_output(&name, tag, port, &generation, &newton_euler, &state, move |m, d| {
                extract(m, d)
            })
        };

        let zmp = dynamic(
            "vector",
            "zmp",
            Box::new(|_, data| {
                // Ground-plane point where the horizontal moment of the root
                // wrench vanishes; near-zero normal force degenerates to the
                // CoM ground projection.
                let wrench = &data.root_wrench;
                let fz = wrench[2];
                let mut zmp = Vector::zeros(3);
                if fz.abs() > 1e-9 {
                    zmp[0] = -wrench[4] / fz;
                    zmp[1] = wrench[3] / fz;
                } else {
                    zmp[0] = data.com[0];
                    zmp[1] = data.com[1];
                }
                zmp
            }),
        );
        let com = dynamic("vector", "com", Box::new(|_, data| data.com.clone()));
        let jcom = dynamic_output(
            &name,
            "matrix",
            "Jcom",
            &generation,
            &newton_euler,
            &state,
            |_, data| data.jcom.clone(),
        );
        // Model fact, but wired through the driver to match the original
        // graph topology.
        let foot_height = dynamic_output(
            &name,
            "double",
            "footHeight",
            &generation,
            &newton_euler,
            &state,
            |model, _| model.foot_height,
        );
        let inertia = dynamic_output(
            &name,
            "matrix",
            "inertia",
            &generation,
            &newton_euler,
            &state,
            |_, data| {
                let mut m = data.m.clone();
                m.fill_lower_triangle_with_upper_triangle();
                m
            },
        );
        let momenta = dynamic("vector", "momenta", Box::new(|_, data| data.momenta.clone()));
        let angular_momentum = dynamic(
            "vector",
            "angularmomentum",
            Box::new(|_, data| data.momenta.rows(3, 3).into_owned()),
        );
        let dynamic_drift = dynamic(
            "vector",
            "dynamicDrift",
            Box::new(|_, data| data.drift.clone()),
        );

        let static_vec = |port: &str, extract: Box<dyn Fn(&Model) -> Vector>| {
            static_output(&name, "vector", port, &generation, &state, move |m| extract(m))
        };
        let upper_joint_limits =
            static_vec("upperJl", Box::new(|m| m.upper_position_limit.clone()));
        let lower_joint_limits =
            static_vec("lowerJl", Box::new(|m| m.lower_position_limit.clone()));
        let upper_velocity_limits =
            static_vec("upperVl", Box::new(|m| m.upper_velocity_limit.clone()));
        let lower_velocity_limits =
            static_vec("lowerVl", Box::new(|m| m.lower_velocity_limit.clone()));
        let upper_torque_limits =
            static_vec("upperTl", Box::new(|m| m.upper_torque_limit.clone()));
        let lower_torque_limits =
            static_vec("lowerTl", Box::new(|m| m.lower_torque_limit.clone()));
        let inertia_rotor = static_vec("inertiaRotor", Box::new(|m| m.rotor_inertia.clone()));
        let gear_ratio = static_vec("gearRatio", Box::new(|m| m.gear_ratio.clone()));

        // Gearing correction on the actuated diagonal block, after the six
        // free-flyer rows.
        let inertia_real = {
            let real_name = qualified(&name, Direction::Output, "matrix", "inertiaReal");
            let inertia_up = inertia.clone();
            let gear_up = gear_ratio.clone();
            let rotor_up = inertia_rotor.clone();
            Signal::dependent(
                real_name,
                &generation,
                vec![inertia.handle(), gear_ratio.handle(), inertia_rotor.handle()],
                Box::new(move |tick| {
                    let mut m = inertia_up.read(tick)?;
                    let gears = gear_up.read(tick)?;
                    let rotors = rotor_up.read(tick)?;
                    for (i, (g, r)) in gears.iter().zip(rotors.iter()).enumerate() {
                        let k = 6 + i;
                        m[(k, k)] += g * g * r;
                    }
                    Ok(m)
                }),
            )
        };

        let registered: Vec<SignalHandle> = vec![
            joint_position.handle(),
            free_flyer_position.handle(),
            joint_velocity.handle(),
            free_flyer_velocity.handle(),
            joint_acceleration.handle(),
            free_flyer_acceleration.handle(),
            zmp.handle(),
            com.handle(),
            jcom.handle(),
            foot_height.handle(),
            upper_joint_limits.handle(),
            lower_joint_limits.handle(),
            upper_velocity_limits.handle(),
            lower_velocity_limits.handle(),
            upper_torque_limits.handle(),
            lower_torque_limits.handle(),
            inertia.handle(),
            inertia_real.handle(),
            inertia_rotor.handle(),
            gear_ratio.handle(),
            momenta.handle(),
            angular_momentum.handle(),
            dynamic_drift.handle(),
        ];
        debug!(
            "entity '{}' registered {} signals",
            name,
            registered.len()
        );

        Self {
            name,
            generation,
            state,
            registered,
            joint_position,
            free_flyer_position,
            joint_velocity,
            free_flyer_velocity,
            joint_acceleration,
            free_flyer_acceleration,
            newton_euler,
            zmp,
            com,
            jcom,
            foot_height,
            inertia,
            inertia_real,
            momenta,
            angular_momentum,
            dynamic_drift,
            upper_joint_limits,
            lower_joint_limits,
            upper_velocity_limits,
            lower_velocity_limits,
            upper_torque_limits,
            lower_torque_limits,
            inertia_rotor,
            gear_ratio,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds a model from a URDF file and atomically replaces the model and
    /// its workspace, then bumps the generation so every cached output is
    /// stale. A parse failure leaves the previous pair intact.
    ///
    /// Must not be called while reads are in flight.
    pub fn set_urdf_path(&self, path: impl AsRef<Path>) -> Result<(), SignalError> {
        let path = path.as_ref();
        let model = self.state.borrow().loader.build_model(path)?;
        validate_model(path, &model)?;
        let (nq, nv) = (model.nq, model.nv);
        let data = Data::new(&model);
        {
            let mut guard = self.state.borrow_mut();
            guard.data = Some(data);
            guard.model = Some(model);
            guard.urdf_path = Some(path.to_owned());
        }
        self.generation.bump();
        info!(
            "entity '{}' loaded model from '{}' (nq={}, nv={})",
            self.name,
            path.display(),
            nq,
            nv
        );
        Ok(())
    }

    /// Path of the last successful URDF load, if any.
    pub fn urdf_path(&self) -> Option<PathBuf> {
        self.state.borrow().urdf_path.clone()
    }

    /// One inverse-dynamics pass outside the signal graph, returning the
    /// joint torques. A host-side check of an engine binding. It writes into
    /// the shared workspace, so the generation is bumped afterwards and the
    /// next output read re-runs the driver instead of serving a cache that no
    /// longer matches the workspace.
    pub fn check_inverse_dynamics(
        &self,
        q: &Vector,
        v: &Vector,
        a: &Vector,
    ) -> Result<Vector, SignalError> {
        let tau = {
            let mut guard = self.state.borrow_mut();
            let RobotState {
                engine, data, model, ..
            } = &mut *guard;
            let model = model
                .as_ref()
                .ok_or_else(|| SignalError::InvalidModel(self.name.clone()))?;
            let data = data
                .as_mut()
                .ok_or_else(|| SignalError::InvalidModel(self.name.clone()))?;
            engine.inverse_dynamics(model, data, q, v, a)?;
            data.tau.clone()
        };
        self.generation.bump();
        Ok(tau)
    }

    /// Fully qualified names of the registered signals, in registration
    /// order.
    pub fn signal_names(&self) -> Vec<String> {
        self.registered
            .iter()
            .map(|signal| signal.name().to_owned())
            .collect()
    }
}

/// A model must carry a free-flyer base and gearing vectors with one entry
/// per actuated joint; everything downstream sizes its indexing on `nq >= 7`
/// and `nv >= 6`.
fn validate_model(path: &Path, model: &Model) -> Result<(), SignalError> {
    let reject = |reason: String| SignalError::Parse {
        path: path.display().to_string(),
        reason,
    };
    if model.nq < 7 || model.nv < 6 {
        return Err(reject(format!(
            "model '{}' has no free-flyer base (nq={}, nv={})",
            model.name, model.nq, model.nv
        )));
    }
    let actuated = model.nv - 6;
    for (label, len) in [
        ("rotor_inertia", model.rotor_inertia.len()),
        ("gear_ratio", model.gear_ratio.len()),
    ] {
        if len != actuated {
            return Err(reject(format!(
                "model '{}' has {len} {label} entries for {actuated} actuated joints",
                model.name
            )));
        }
    }
    Ok(())
}

impl fmt::Display for DynamicEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DynamicEntity {}:", self.name)?;
        for signal in &self.registered {
            writeln!(f, "  {}", signal.name())?;
        }
        writeln!(f, "  {}", self.newton_euler.name())?;
        Ok(())
    }
}
