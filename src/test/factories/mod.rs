//! Hand-built modules mirroring the shapes the patchers expect in a real game build.

use crate::{
    assembly::{InstrId, Instruction, OpCode, Operand, OperandKind},
    metadata::{
        FieldDef, FieldRef, MethodBody, MethodDef, MethodFlags, MethodRef, Module, Parameter,
        TypeDef, TypeFlags, TypeRef,
    },
};

/// A body of the given opcodes. Operands are dummies of the right kind; branches point at
/// the first instruction.
pub fn body_of(opcodes: &[OpCode]) -> MethodBody {
    let mut body = MethodBody::new();
    for opcode in opcodes {
        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::String => Operand::String(String::new()),
            OperandKind::Type | OperandKind::Token => Operand::Type(TypeRef::object()),
            OperandKind::Field => Operand::Field(FieldRef::new(
                TypeRef::object(),
                "value",
                TypeRef::object(),
            )),
            OperandKind::Method | OperandKind::Signature => Operand::Method(MethodRef::new(
                TypeRef::object(),
                "Method",
                Vec::new(),
                TypeRef::void(),
            )),
            OperandKind::Target => Operand::Target(InstrId(0)),
            OperandKind::Switch => Operand::Switch(vec![InstrId(0)]),
            OperandKind::Argument => Operand::Argument(0),
            OperandKind::Local => Operand::Local(0),
            _ => Operand::Immediate(crate::assembly::Immediate::Int32(0)),
        };
        let instruction = Instruction::new(*opcode, operand)
            .unwrap_or_else(|error| panic!("cannot build {opcode}: {error}"));
        body.push(instruction);
    }
    body
}

fn class(namespace: &str, name: &str) -> TypeDef {
    TypeDef::new(namespace, name)
}

fn value_type(namespace: &str, name: &str) -> TypeDef {
    let mut ty = TypeDef::new(namespace, name);
    ty.flags = TypeFlags::VALUE_TYPE | TypeFlags::SEALED;
    ty
}

fn interface(namespace: &str, name: &str) -> TypeDef {
    let mut ty = TypeDef::new(namespace, name);
    ty.flags = TypeFlags::INTERFACE | TypeFlags::ABSTRACT;
    ty
}

fn instance(name: &str, parameters: Vec<Parameter>, return_type: TypeRef, body: MethodBody) -> MethodDef {
    let mut method = MethodDef::new(name);
    method.flags = MethodFlags::empty();
    method.parameters = parameters;
    method.return_type = return_type;
    method.body = Some(body);
    method
}

fn returning() -> MethodBody {
    body_of(&[OpCode::Nop, OpCode::Ret])
}

/// `mscorlib`: the handful of runtime types the fixtures reference.
pub fn runtime_module() -> Module {
    let mut module = Module::new("mscorlib");
    module.add_type(class("System", "Object"));
    let string = module.add_type(class("System", "String"));
    let mut concat = MethodDef::new("Concat");
    concat.parameters = vec![
        Parameter::new("str0", TypeRef::string()),
        Parameter::new("str1", TypeRef::string()),
    ];
    concat.return_type = TypeRef::string();
    concat.body = None;
    concat.flags |= MethodFlags::EXTERNAL;
    module.add_method(string, concat);

    for name in ["Boolean", "Int32", "Single", "Byte", "Void"] {
        module.add_type(value_type("System", name));
    }
    module.add_type(class("System.IO", "BinaryReader"));
    module.add_type(class("System.IO", "BinaryWriter"));
    module
}

/// `UnityEngine`: the engine types used by the RPC fixtures.
pub fn unity_module() -> Module {
    let mut module = Module::new("UnityEngine");
    module.add_type(value_type("UnityEngine", "NetworkMessageInfo"));
    module.add_type(class("UnityEngine", "RPC"));
    module.add_type(class("UnityEngine", "MonoBehaviour"));
    module
}

/// `SurvivalKit`: the event dispatcher and the game lifecycle callbacks.
pub fn dispatcher_module() -> Module {
    let mut module = Module::new("SurvivalKit");
    let manager = module.add_type(class("SurvivalKit.Events", "EventManager"));
    let mut fire = MethodDef::new("FireEvent");
    fire.parameters = vec![
        Parameter::new("name", TypeRef::string()),
        Parameter::new("pars", TypeRef::new("System", "Object[]")),
    ];
    fire.return_type = TypeRef::new("System", "Object[]");
    module.add_method(manager, fire);

    let main = module.add_type(class("SurvivalKit", "SKMain"));
    module.add_method(main, MethodDef::new("onGameInit"));
    for name in ["onGameEnable", "onGameDisable"] {
        let mut callback = MethodDef::new(name);
        callback.parameters = vec![Parameter::new("manager", TypeRef::new("", "GameManager"))];
        module.add_method(main, callback);
    }
    module
}

/// The default case of `ChunkCluster::Init` starts at position 11.
///
/// ```text
///  0: ldarg.1
///  1: switch (3, 7)
///  2: br 11
///  3: ldarg.0          7: ldarg.0          11: ldarg.0
///  4: ldstr "flat"     8: ldstr "cave"     12: ldnull
///  5: stfld provider   9: stfld provider   13: stfld provider
///  6: br 14           10: br 14            14: ret
/// ```
pub fn chunk_cluster_init() -> MethodBody {
    let provider = FieldRef::new(
        TypeRef::new("", "ChunkCluster"),
        "provider",
        TypeRef::new("", "IChunkProvider"),
    );
    let mut body = MethodBody::new();
    let ret = body.create(Instruction::op(OpCode::Ret));
    let case = |body: &mut MethodBody, value: Option<&str>| -> Vec<InstrId> {
        let mut ids = vec![body.create(Instruction::op(OpCode::Ldarg0))];
        ids.push(body.create(match value {
            Some(value) => Instruction::ldstr(value),
            None => Instruction::op(OpCode::Ldnull),
        }));
        ids.push(body.create(
            Instruction::new(OpCode::Stfld, Operand::Field(provider.clone())).unwrap_or_else(|e| panic!("{e}")),
        ));
        ids
    };
    let flat = case(&mut body, Some("flat"));
    let cave = case(&mut body, Some("cave"));
    let default = case(&mut body, None);

    body.push(Instruction::op(OpCode::Ldarg1));
    body.push(Instruction::new(OpCode::Switch, Operand::Switch(vec![flat[0], cave[0]])).unwrap_or_else(|e| panic!("{e}")));
    body.push(Instruction::branch(OpCode::Br, default[0]));
    body.order_mut().extend(&flat);
    body.push(Instruction::branch(OpCode::Br, ret));
    body.order_mut().extend(&cave);
    body.push(Instruction::branch(OpCode::Br, ret));
    body.order_mut().extend(&default);
    body.order_mut().push(ret);
    body
}

/// `Read(BinaryReader)` of a network package: returns early through a branch to the final `ret`.
fn package_read() -> MethodBody {
    let mut body = MethodBody::new();
    let ret = body.create(Instruction::op(OpCode::Ret));
    body.push(Instruction::op(OpCode::Ldarg1));
    body.push(Instruction::branch(OpCode::Brfalse, ret));
    body.push(Instruction::op(OpCode::Ldarg0));
    body.push(Instruction::ldc_i4(1));
    body.push(
        Instruction::new(
            OpCode::Stfld,
            Operand::Field(FieldRef::new(TypeRef::new("", "ChatPackage"), "done", TypeRef::boolean())),
        )
        .unwrap_or_else(|e| panic!("{e}")),
    );
    body.order_mut().push(ret);
    body
}

/// `Assembly-CSharp`: a miniature game module.
pub fn game_module() -> Module {
    let mut module = Module::new("Assembly-CSharp");
    module.add_type(class("", "Deobfuscated"));
    module.add_type(value_type("", "EnumChunkProviderId"));
    module.add_type(interface("", "IChunkProvider"));
    module.add_type(value_type("", "PackageType"));
    module.add_type(class("", "World"));
    module.add_type(interface("", "INetConnectionCallbacks"));

    let mut cluster = class("", "ChunkCluster");
    cluster.fields.push(FieldDef {
        name: "provider".to_string(),
        field_type: TypeRef::new("", "IChunkProvider"),
        is_static: false,
    });
    let cluster = module.add_type(cluster);
    module.add_method(
        cluster,
        instance(
            "Init",
            vec![Parameter::new("id", TypeRef::value_type("", "EnumChunkProviderId"))],
            TypeRef::void(),
            chunk_cluster_init(),
        ),
    );

    let connection = module.add_type(class("", "ConnectionManager"));
    let mut cctor = MethodDef::new(".cctor");
    cctor.flags |= MethodFlags::SPECIAL_NAME;
    cctor.body = Some(returning());
    module.add_method(connection, cctor);
    let mut request = instance(
        "RequestChunk",
        vec![
            Parameter::new("x", TypeRef::int32()),
            Parameter::new("who", TypeRef::string()),
        ],
        TypeRef::void(),
        returning(),
    );
    request.attributes.push("UnityEngine.RPC".to_string());
    module.add_method(connection, request);
    let mut ping = instance(
        "Ping",
        vec![Parameter::new(
            "info",
            TypeRef::value_type("UnityEngine", "NetworkMessageInfo"),
        )],
        TypeRef::void(),
        returning(),
    );
    ping.attributes.push("UnityEngine.RPC".to_string());
    module.add_method(connection, ping);
    module.add_method(connection, instance("Helper", Vec::new(), TypeRef::void(), returning()));

    let manager = module.add_type(class("", "GameManager"));
    module.add_method(manager, instance("Awake", Vec::new(), TypeRef::void(), returning()));
    module.add_method(manager, instance("Cleanup", Vec::new(), TypeRef::void(), returning()));
    module.add_method(
        manager,
        instance(
            "SetBlocksRPC",
            vec![Parameter::new("blocks", TypeRef::object())],
            TypeRef::void(),
            returning(),
        ),
    );
    let mut world = instance(
        "get_World",
        Vec::new(),
        TypeRef::new("", "World"),
        body_of(&[OpCode::Ldnull, OpCode::Ret]),
    );
    world.flags |= MethodFlags::SPECIAL_NAME;
    module.add_method(manager, world);

    let mut package = class("", "NetPackage");
    package.flags = TypeFlags::ABSTRACT;
    let package = module.add_type(package);
    let mut abstract_kind = MethodDef::new("GetPackageType");
    abstract_kind.flags = MethodFlags::VIRTUAL | MethodFlags::ABSTRACT;
    abstract_kind.return_type = TypeRef::value_type("", "PackageType");
    abstract_kind.body = None;
    module.add_method(package, abstract_kind);

    let mut chat = class("", "ChatPackage");
    chat.base = Some(TypeRef::new("", "NetPackage"));
    chat.fields.push(FieldDef {
        name: "done".to_string(),
        field_type: TypeRef::boolean(),
        is_static: false,
    });
    let chat = module.add_type(chat);
    let mut kind = instance(
        "GetPackageType",
        Vec::new(),
        TypeRef::value_type("", "PackageType"),
        body_of(&[OpCode::LdcI43, OpCode::Ret]),
    );
    kind.flags = MethodFlags::VIRTUAL;
    module.add_method(chat, kind);
    module.add_method(
        chat,
        instance(
            "Process",
            vec![
                Parameter::new("world", TypeRef::new("", "World")),
                Parameter::new("callbacks", TypeRef::new("", "INetConnectionCallbacks")),
            ],
            TypeRef::void(),
            returning(),
        ),
    );
    module.add_method(
        chat,
        instance(
            "Read",
            vec![Parameter::new("reader", TypeRef::new("System.IO", "BinaryReader"))],
            TypeRef::void(),
            package_read(),
        ),
    );
    module.add_method(
        chat,
        instance(
            "Write",
            vec![Parameter::new("writer", TypeRef::new("System.IO", "BinaryWriter"))],
            TypeRef::void(),
            returning(),
        ),
    );

    let player = module.add_type(class("Game", "Player"));
    let mut create = MethodDef::new("Create");
    create.return_type = TypeRef::new("Game", "Player");
    create.body = Some(body_of(&[OpCode::Ldnull, OpCode::Ret]));
    module.add_method(player, create);
    let mut say = instance(
        "Say",
        vec![Parameter::new("text", TypeRef::string())],
        TypeRef::void(),
        returning(),
    );
    say.attributes.push("RPC".to_string());
    module.add_method(player, say);

    module
}
