// tests/resolve.rs

//! Integration tests for plan resolution from a recipe directory.

mod common;

use cellar::recipe::{Os, ResolveOptions, StepAction, Variant};
use cellar::Error;
use common::Fixture;

fn gdal_book() -> Fixture {
    let fx = Fixture::new();
    fx.recipe("sqlite", &[], "");
    fx.recipe("proj", &["sqlite"], "");
    fx.recipe("geos", &[], "");
    fx.recipe("libtiff", &["zstd"], "");
    fx.recipe("zstd", &[], "");
    fx.recipe("gdal", &["proj", "geos", "libtiff"], "");
    fx
}

fn assert_topological(names: &[&str], book: &cellar::recipe::RecipeBook) {
    for (pos, name) in names.iter().enumerate() {
        let recipe = book.get(name).unwrap();
        for dep in recipe.all_dependency_names() {
            let dep_pos = names.iter().position(|n| *n == dep).unwrap();
            assert!(dep_pos < pos, "{} must come before {}", dep, name);
        }
    }
}

#[test]
fn test_dependencies_resolve_before_dependents() {
    let fx = gdal_book();
    let book = fx.book();
    let plan = book
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux))
        .unwrap();

    let names = plan.names();
    assert_eq!(names.len(), 6);
    assert_eq!(names.last(), Some(&"gdal"));
    assert_topological(&names, &book);
    assert_eq!(names, vec!["geos", "sqlite", "proj", "zstd", "libtiff", "gdal"]);
}

#[test]
fn test_resolution_is_deterministic() {
    let fx = gdal_book();
    let book = fx.book();
    let options = ResolveOptions::for_os(Os::Linux);

    let first = book.resolve(&["gdal", "zstd"], &options).unwrap();
    let second = book.resolve(&["zstd", "gdal"], &options).unwrap();
    assert_eq!(first.names(), second.names());

    // Reloading the directory changes nothing either
    let again = fx.book().resolve(&["gdal"], &options).unwrap();
    assert_eq!(first.names(), again.names());
}

#[test]
fn test_layers_group_independent_recipes() {
    let fx = gdal_book();
    let plan = fx
        .book()
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux))
        .unwrap();

    let layers: Vec<Vec<&str>> = plan
        .layers()
        .iter()
        .map(|layer| layer.iter().map(|&idx| plan.get(idx).unwrap().name()).collect())
        .collect();
    assert_eq!(
        layers,
        vec![
            vec!["geos", "sqlite", "zstd"],
            vec!["proj", "libtiff"],
            vec!["gdal"],
        ]
    );
}

#[test]
fn test_cycle_is_rejected() {
    let fx = Fixture::new();
    fx.recipe("a", &["b"], "");
    fx.recipe("b", &["a"], "");

    let err = fx
        .book()
        .resolve(&["a"], &ResolveOptions::for_os(Os::Linux))
        .unwrap_err();
    match err {
        Error::Cycle { cycle } => assert_eq!(cycle, vec!["a", "b", "a"]),
        other => panic!("expected a cycle, got {}", other),
    }
}

#[test]
fn test_missing_dependency_is_unresolved() {
    let fx = Fixture::new();
    fx.recipe("gdal", &["proj"], "");

    let err = fx
        .book()
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::UnresolvedDependency { ref recipe, ref dependency }
            if recipe == "gdal" && dependency == "proj"
    ));

    // Declaring it a system package satisfies it
    let plan = fx
        .book()
        .with_system_packages(["proj"])
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux))
        .unwrap();
    assert_eq!(plan.names(), vec!["gdal"]);
    assert_eq!(plan.recipes()[0].system_deps[0].name, "proj");
}

#[test]
fn test_head_applies_to_named_targets_only() {
    let fx = Fixture::new();
    let head = "[head]\nurl = \"https://example.com/%(name)s.git\"\n";
    fx.recipe("liblouis", &[], head);
    fx.recipe("octave", &["liblouis"], head);

    let options = ResolveOptions::for_os(Os::Linux).with_head("octave");
    let plan = fx.book().resolve(&["octave"], &options).unwrap();

    let variant = |name: &str| plan.get(plan.position(name).unwrap()).unwrap().recipe.variant;
    assert_eq!(variant("octave"), Variant::Head);
    assert_eq!(variant("liblouis"), Variant::Stable);

    let err = fx
        .book()
        .resolve(&["octave"], &ResolveOptions::for_os(Os::Linux).with_head("liblouis"))
        .unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
}

#[test]
fn test_os_guards_select_flags_and_dependencies() {
    let fx = Fixture::new();
    fx.recipe("curl", &[], "");
    fx.recipe("mesa", &[], "");
    fx.recipe_toml(
        "gdal",
        r#"uses_from_macos = ["curl"]"#,
        r#"
[os.linux]
depends = ["mesa"]
args = ["--with-curl=%(curl:bin)s/curl-config"]

[os.macos]
args = ["--with-curl=/usr/bin/curl-config", "--with-opencl"]

[[build]]
configure = true
args = ["--prefix=%(prefix)s"]
"#,
    );
    let book = fx.book();
    let linux = book
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux))
        .unwrap();
    let macos = book
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Macos))
        .unwrap();

    assert_eq!(linux.names(), vec!["curl", "mesa", "gdal"]);
    assert_eq!(macos.names(), vec!["gdal"]);

    let configure_args = |plan: &cellar::recipe::BuildPlan| {
        let gdal = &plan.get(plan.position("gdal").unwrap()).unwrap().recipe;
        match &gdal.steps[0].action {
            StepAction::Configure { args } => args.clone(),
            other => panic!("expected configure, got {:?}", other),
        }
    };
    assert_eq!(
        configure_args(&linux),
        vec!["--prefix=%(prefix)s", "--with-curl=%(curl:bin)s/curl-config"]
    );
    assert_eq!(
        configure_args(&macos),
        vec!["--prefix=%(prefix)s", "--with-curl=/usr/bin/curl-config", "--with-opencl"]
    );
}

#[test]
fn test_conflicting_recipes_are_rejected() {
    let fx = Fixture::new();
    fx.recipe("avce00", &[], "");
    fx.recipe(
        "gdal",
        &[],
        "[[conflicts]]\nname = \"avce00\"\nbecause = \"both install a cpl_conv.h header\"\n",
    );

    let err = fx
        .book()
        .resolve(&["gdal", "avce00"], &ResolveOptions::for_os(Os::Linux))
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    assert!(fx
        .book()
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux))
        .is_ok());
}
