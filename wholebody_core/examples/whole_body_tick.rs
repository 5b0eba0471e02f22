// wholebody_core/examples/whole_body_tick.rs

//! Minimal host loop: build an entity against the fixture engine, load a
//! model, plug the configuration inputs and read derived quantities for a
//! few ticks.

use wholebody_core::prelude::*;

fn main() -> Result<(), SignalError> {
    let engine = FixtureEngine::new();
    let loader = FixtureLoader::new().with_model("talos.urdf", single_joint_model("talos", 92.0));
    let entity = DynamicEntity::new("robot", Box::new(engine), Box::new(loader));

    entity.set_urdf_path("talos.urdf")?;
    println!("{entity}");

    entity
        .free_flyer_position
        .plug_value(Vector::from_vec(vec![0.0, 0.0, 0.9, 0.0, 0.0, 0.0]));
    entity.joint_position.plug_value(Vector::from_element(1, 0.2));
    entity.free_flyer_velocity.plug_value(Vector::zeros(6));
    entity.joint_velocity.plug_value(Vector::zeros(1));
    entity.free_flyer_acceleration.plug_value(Vector::zeros(6));
    entity.joint_acceleration.plug_value(Vector::zeros(1));

    for tick in 1..=3 {
        let com = entity.com.read(tick)?;
        let zmp = entity.zmp.read(tick)?;
        println!("tick {tick}: com = {} zmp = {}", com.transpose(), zmp.transpose());
    }

    println!("upper joint limits: {}", entity.upper_joint_limits.read(3)?.transpose());
    Ok(())
}
