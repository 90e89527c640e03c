// tests/shipped_recipes.rs

//! The recipes shipped in `recipes/` must parse, lint clean and resolve.

use cellar::Error;
use cellar::recipe::{
    Expectation, Os, RecipeBook, ResolveOptions, Source, StepAction, TestAction, Variant, VcsKind,
    parse_recipe_file, validate_recipe,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn recipes_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("recipes")
}

/// The shipped recipes, with every dependency they lack declared as a system package
fn book() -> RecipeBook {
    let book = RecipeBook::load_dir(&recipes_dir()).unwrap();
    let mut missing = BTreeSet::new();
    for name in book.names() {
        for dep in book.get(name).unwrap().all_dependency_names() {
            if book.get(dep).is_none() {
                missing.insert(dep.to_string());
            }
        }
    }
    book.with_system_packages(missing)
}

#[test]
fn test_shipped_recipes_lint_clean() {
    let mut count = 0;
    for entry in std::fs::read_dir(recipes_dir()).unwrap() {
        let path = entry.unwrap().path();
        let recipe = parse_recipe_file(&path).unwrap();
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.is_empty(), "{}: {:?}", path.display(), warnings);
        count += 1;
    }
    assert_eq!(count, 3);
}

#[test]
fn test_gdal_resolves_per_os() {
    let book = book();
    let linux = book
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux))
        .unwrap();
    let gdal = &linux.recipes()[0];
    assert_eq!(linux.names(), vec!["gdal"]);
    assert_eq!(gdal.recipe.keg_name(), "3.5.1_1");
    assert_eq!(
        gdal.recipe.source.url(),
        "http://download.osgeo.org/gdal/3.5.1/gdal-3.5.1.tar.xz"
    );

    let linux_deps: Vec<&str> = gdal.system_deps.iter().map(|d| d.name.as_str()).collect();
    for dep in ["proj", "geos", "libtiff", "curl", "gcc", "util-linux", "pkg-config"] {
        assert!(linux_deps.contains(&dep), "missing {}", dep);
    }

    let macos = book
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Macos))
        .unwrap();
    let macos_deps: Vec<&str> = macos.recipes()[0]
        .system_deps
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert!(!macos_deps.contains(&"curl"));
    assert!(!macos_deps.contains(&"util-linux"));

    // Linux link flags extend the inherited ones
    assert_eq!(
        gdal.recipe.env_append.get("LDFLAGS").map(String::as_str),
        Some("-L%(buildpath)s/.libs")
    );
    assert!(!gdal.recipe.env.contains_key("LDFLAGS"));
    assert!(macos.recipes()[0].recipe.env_append.get("LDFLAGS").is_none());

    // `make man` only runs for head builds
    let makes = |plan: &cellar::recipe::BuildPlan| {
        plan.recipes()[0]
            .recipe
            .steps
            .iter()
            .filter(|s| matches!(&s.action, StepAction::Run { args, .. } if args.first().is_some_and(|a| a == "man")))
            .count()
    };
    assert_eq!(makes(&linux), 0);
    let head = book
        .resolve(&["gdal"], &ResolveOptions::for_os(Os::Linux).with_head("gdal"))
        .unwrap();
    assert_eq!(makes(&head), 1);
}

#[test]
fn test_gdal_and_octave_refuse_gcc_5() {
    let book = book();
    let with = |compiler: &str| {
        ResolveOptions::for_os(Os::Linux).with_compiler(Some(compiler.parse().unwrap()))
    };
    for name in ["gdal", "octave"] {
        assert!(
            matches!(book.resolve(&[name], &with("gcc@5")), Err(Error::UnsupportedCompiler { .. })),
            "{} accepted gcc 5",
            name
        );
        assert!(book.resolve(&[name], &with("gcc@11")).is_ok());
    }
    assert!(book.get("gdal").unwrap().livecheck.is_some());
}

#[test]
fn test_octave_head_is_mercurial() {
    let book = book();
    let plan = book
        .resolve(&["octave"], &ResolveOptions::for_os(Os::Linux).with_head("octave"))
        .unwrap();
    let octave = &plan.recipes()[0].recipe;
    assert_eq!(octave.variant, Variant::Head);
    match &octave.source {
        Source::Vcs { url, branch, vcs } => {
            assert_eq!(url, "https://hg.savannah.gnu.org/hgweb/octave");
            assert_eq!(branch.as_deref(), Some("default"));
            assert_eq!(*vcs, VcsKind::Hg);
        }
        other => panic!("expected a checkout, got {:?}", other),
    }
    assert!(octave.dependency_names().any(|d| d == "bison"));
}

#[test]
fn test_liblouis_translates_on_stdin() {
    let book = book();
    let plan = book
        .resolve(&["liblouis"], &ResolveOptions::for_os(Os::Linux))
        .unwrap();
    let liblouis = &plan.recipes()[0].recipe;
    assert_eq!(liblouis.license.as_deref(), Some("GPL-3.0-or-later AND LGPL-2.1-or-later"));
    // autogen.sh is head-only
    assert_eq!(liblouis.steps.len(), 8);

    match &liblouis.tests[0].action {
        TestAction::Run { stdin, expect, .. } => {
            assert_eq!(stdin.as_deref(), Some("42"));
            assert_eq!(*expect, Expectation::Stdout("⠼⠙⠃".to_string()));
        }
        other => panic!("expected a run step, got {:?}", other),
    }
}
