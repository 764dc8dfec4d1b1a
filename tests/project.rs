//! Loading module images from disk, patching them and writing the result back.

use cilhook::{
    metadata::{MethodFlags, Parameter},
    prelude::*,
};
use std::{fs, path::Path};

fn target() -> Module {
    let mut module = Module::new("Assembly-CSharp");
    module.add_type(TypeDef::new("", "Deobfuscated"));
    let world = module.add_type(TypeDef::new("Game", "World"));
    let mut tick = MethodDef::new("Tick");
    tick.flags = MethodFlags::empty();
    let body = tick.body.get_or_insert_with(MethodBody::new);
    body.push(Instruction::ldarg(0));
    body.push(Instruction::op(OpCode::Pop));
    body.push(Instruction::op(OpCode::Ret));
    module.add_method(world, tick);
    module
}

fn dispatcher() -> Module {
    let mut module = Module::new("SurvivalKit");
    let manager = module.add_type(TypeDef::new("SurvivalKit.Events", "EventManager"));
    let mut fire = MethodDef::new("FireEvent");
    fire.parameters = vec![
        Parameter::new("name", TypeRef::string()),
        Parameter::new("pars", TypeRef::new("System", "Object[]")),
    ];
    fire.return_type = TypeRef::new("System", "Object[]");
    module.add_method(manager, fire);
    module
}

fn write(dir: &Path, name: &str, module: &Module) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, module.to_json().unwrap()).unwrap();
    path
}

#[test]
fn load_patch_and_write_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "Assembly-CSharp.json", &target());
    let kit = write(dir.path(), "SurvivalKit.json", &dispatcher());

    let mut project = ProjectLoader::new()
        .target(&input)
        .dependency(&kit)
        .version_marker("Deobfuscated")
        .build()?;

    let script = PatchScript::parse(
        r#"<patches>
             <hook type="Game.World" name="OnTick" insertAt="0" cancellable="true">
               <method name="Tick"><opcode index="-1" name="ret"/></method>
             </hook>
           </patches>"#,
    )?;
    let report = project.run(None, Some(script))?;
    assert_eq!(report.hooks(), 1);
    assert_eq!(report.failures(), 0);

    let output = PatchProject::output_path(&input);
    assert_eq!(output, dir.path().join("Assembly-CSharp.hooked.json"));
    project.write_to(&output)?;

    let reloaded = ProjectLoader::new().target(&output).build()?;
    let tick = reloaded
        .target()
        .query_methods()
        .declaring_type("Game.World")
        .name("Tick")
        .require()?;
    let body = reloaded.target().method(tick).unwrap().body.as_ref().unwrap();
    assert_eq!(body.at(0).unwrap().opcode, OpCode::Ldstr);
    assert!(body.len() > 3);
    // the cancel check jumps over its own ret into the original body
    let branch = body
        .instructions()
        .find(|instruction| instruction.opcode == OpCode::Brfalse)
        .unwrap();
    let target = branch.targets()[0];
    assert!(body.position_of(target).is_some());
    Ok(())
}

#[test]
fn startup_errors_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "Assembly-CSharp.json", &dispatcher());

    let missing = ProjectLoader::new()
        .target(&input)
        .dependency(dir.path().join("mscorlib.json"))
        .build()
        .unwrap_err();
    assert!(matches!(missing, Error::MissingModule { .. }));
    assert!(missing.is_fatal());

    let unprepared = ProjectLoader::new()
        .target(&input)
        .version_marker("Deobfuscated")
        .build()
        .unwrap_err();
    assert!(matches!(unprepared, Error::VersionMarkerMissing { .. }));

    let garbage = dir.path().join("broken.json");
    fs::write(&garbage, "[1, 2").unwrap();
    let invalid = ProjectLoader::new().target(&garbage).build().unwrap_err();
    assert!(matches!(invalid, Error::InvalidModule { .. }));
}
