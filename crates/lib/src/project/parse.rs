//! Mapping between the descriptor YAML schema and the typed project.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

use super::{BuildDepend, FuzzyRef, Package, PackageKind, Project, ProjectError, SourceDescriptor, SourceKind};

/// A YAML scalar read as text, so `version: 1.0` and `jobs: 4` both work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
struct Scalar(String);

impl<'de> Deserialize<'de> for Scalar {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    scalar_text(Value::deserialize(deserializer)?)
      .map(Scalar)
      .ok_or_else(|| D::Error::custom("expected a string, number or boolean"))
  }
}

fn scalar_text(value: Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawProject {
  #[serde(skip_serializing_if = "Option::is_none")]
  package: Option<RawPackage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  runtime: Option<RawRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  base: Option<RawRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  depends: Option<Vec<RawDepend>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  source: Option<RawSource>,
  #[serde(skip_serializing_if = "Option::is_none")]
  variables: Option<Mapping>,
  #[serde(skip_serializing_if = "Option::is_none")]
  build: Option<RawBuild>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawPackage {
  #[serde(skip_serializing_if = "Option::is_none")]
  id: Option<Scalar>,
  #[serde(skip_serializing_if = "Option::is_none")]
  name: Option<Scalar>,
  #[serde(skip_serializing_if = "Option::is_none")]
  version: Option<Scalar>,
  #[serde(skip_serializing_if = "Option::is_none")]
  kind: Option<Scalar>,
  #[serde(skip_serializing_if = "Option::is_none")]
  description: Option<String>,
}

/// `id/version[/arch]` shorthand or the expanded mapping.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawRef {
  Text(String),
  Fields {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arch: Option<String>,
  },
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawSource {
  #[serde(skip_serializing_if = "Option::is_none")]
  kind: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  commit: Option<Scalar>,
  #[serde(skip_serializing_if = "Option::is_none")]
  version: Option<Scalar>,
  #[serde(skip_serializing_if = "Option::is_none")]
  digest: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawDepend {
  #[serde(skip_serializing_if = "Option::is_none")]
  id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  version: Option<Scalar>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  kind: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  source: Option<RawSource>,
  #[serde(skip_serializing_if = "Option::is_none")]
  build: Option<RawBuild>,
  #[serde(skip_serializing_if = "Option::is_none")]
  variables: Option<Mapping>,
}

/// Either the script text or the `manual` step form.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawBuild {
  Script(String),
  Steps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    manual: RawManual,
  },
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawManual {
  configure: Option<String>,
  build: Option<String>,
  install: Option<String>,
}

impl RawBuild {
  fn into_script(self) -> String {
    match self {
      RawBuild::Script(script) => script,
      RawBuild::Steps { manual, .. } => [manual.configure, manual.build, manual.install]
        .into_iter()
        .flatten()
        .map(|step| step.trim_end().to_string())
        .filter(|step| !step.is_empty())
        .collect::<Vec<_>>()
        .join("\n"),
    }
  }
}

fn missing(field: impl Into<String>) -> ProjectError {
  ProjectError::MissingField(field.into())
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ProjectError {
  ProjectError::InvalidField {
    field: field.into(),
    reason: reason.into(),
  }
}

fn non_empty(value: Option<Scalar>) -> Option<String> {
  value.map(|s| s.0.trim().to_string()).filter(|s| !s.is_empty())
}

pub(super) fn parse_project(text: &str) -> Result<Project, ProjectError> {
  let raw: RawProject = serde_yaml::from_str(text)?;

  let package = convert_package(raw.package.ok_or_else(|| missing("package"))?)?;
  let source = raw.source.map(|s| convert_source(s, "source")).transpose()?;
  let runtime = raw.runtime.map(|r| convert_ref(r, "runtime")).transpose()?;
  let base = raw.base.map(|r| convert_ref(r, "base")).transpose()?;
  let variables = convert_variables(raw.variables, "variables")?;
  let depends = raw
    .depends
    .unwrap_or_default()
    .into_iter()
    .enumerate()
    .map(|(index, depend)| convert_depend(depend, &format!("depends[{index}]")))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(Project {
    package,
    runtime,
    base,
    depends,
    source,
    variables,
    build: raw.build.map(RawBuild::into_script),
    config_file_path: None,
    build_script_path: None,
  })
}

fn convert_package(raw: RawPackage) -> Result<Package, ProjectError> {
  let id = non_empty(raw.id).ok_or_else(|| missing("package.id"))?;
  let version = non_empty(raw.version).ok_or_else(|| missing("package.version"))?;
  let kind = non_empty(raw.kind)
    .ok_or_else(|| missing("package.kind"))?
    .parse::<PackageKind>()
    .map_err(|reason| invalid("package.kind", reason))?;

  Ok(Package {
    name: non_empty(raw.name).unwrap_or_else(|| id.clone()),
    id,
    version,
    kind,
    description: raw.description.unwrap_or_default(),
  })
}

fn convert_ref(raw: RawRef, field: &str) -> Result<FuzzyRef, ProjectError> {
  let reference = match raw {
    RawRef::Text(text) => {
      let mut parts = text.trim().split('/').map(str::to_string);
      let id = parts.next().unwrap_or_default();
      FuzzyRef {
        id,
        version: parts.next().filter(|v| !v.is_empty()),
        arch: parts.next().filter(|a| !a.is_empty()),
      }
    }
    RawRef::Fields { id, version, arch } => FuzzyRef {
      id: id.trim().to_string(),
      version: non_empty(version),
      arch: arch.filter(|a| !a.is_empty()),
    },
  };
  if reference.id.is_empty() {
    return Err(missing(format!("{field}.id")));
  }
  Ok(reference)
}

fn convert_source(raw: RawSource, field: &str) -> Result<SourceDescriptor, ProjectError> {
  let kind = raw
    .kind
    .filter(|k| !k.trim().is_empty())
    .ok_or_else(|| missing(format!("{field}.kind")))?
    .trim()
    .parse::<SourceKind>()
    .map_err(|reason| invalid(format!("{field}.kind"), reason))?;
  let url = raw.url.filter(|u| !u.trim().is_empty());
  let digest = raw.digest.filter(|d| !d.trim().is_empty());

  if url.is_none() {
    return Err(missing(format!("{field}.url")));
  }
  if matches!(kind, SourceKind::Archive | SourceKind::File) && digest.is_none() {
    return Err(missing(format!("{field}.digest")));
  }

  Ok(SourceDescriptor {
    kind,
    url,
    commit: non_empty(raw.commit),
    version: non_empty(raw.version),
    digest,
  })
}

fn convert_depend(raw: RawDepend, field: &str) -> Result<BuildDepend, ProjectError> {
  let id = raw
    .id
    .map(|id| id.trim().to_string())
    .filter(|id| !id.is_empty())
    .ok_or_else(|| missing(format!("{field}.id")))?;
  let source = raw
    .source
    .map(|s| convert_source(s, &format!("{field}.source")))
    .transpose()?;

  let version = non_empty(raw.version);
  let build = raw.build.map(RawBuild::into_script);
  // A buildable dependency is committed under its own version.
  if version.is_none() && source.is_some() && build.is_some() {
    return Err(missing(format!("{field}.version")));
  }

  Ok(BuildDepend {
    id,
    version,
    kind: raw.kind,
    source,
    build,
    variables: convert_variables(raw.variables, &format!("{field}.variables"))?,
  })
}

fn is_shell_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn convert_variables(raw: Option<Mapping>, field: &str) -> Result<Vec<(String, String)>, ProjectError> {
  let mut variables = Vec::new();
  for (key, value) in raw.unwrap_or_default() {
    let key = scalar_text(key).ok_or_else(|| invalid(field, "variable names must be scalars"))?;
    if !is_shell_identifier(&key) {
      return Err(invalid(format!("{field}.{key}"), "not a valid shell variable name"));
    }
    let value = match value {
      Value::Null => String::new(),
      other => scalar_text(other).ok_or_else(|| invalid(format!("{field}.{key}"), "expected a scalar value"))?,
    };
    variables.push((key, value));
  }
  Ok(variables)
}

fn render_ref(reference: &FuzzyRef) -> RawRef {
  RawRef::Fields {
    id: reference.id.clone(),
    version: reference.version.clone().map(Scalar),
    arch: reference.arch.clone(),
  }
}

fn render_source(source: &SourceDescriptor) -> RawSource {
  RawSource {
    kind: Some(source.kind.as_str().to_string()),
    url: source.url.clone(),
    commit: source.commit.clone().map(Scalar),
    version: source.version.clone().map(Scalar),
    digest: source.digest.clone(),
  }
}

fn render_variables(variables: &[(String, String)]) -> Option<Mapping> {
  if variables.is_empty() {
    return None;
  }
  Some(
    variables
      .iter()
      .map(|(k, v)| (Value::String(k.clone()), Value::String(v.clone())))
      .collect(),
  )
}

pub(super) fn render_project(project: &Project) -> Result<String, ProjectError> {
  let package = &project.package;
  let raw = RawProject {
    package: Some(RawPackage {
      id: Some(Scalar(package.id.clone())),
      name: Some(Scalar(package.name.clone())),
      version: Some(Scalar(package.version.clone())),
      kind: Some(Scalar(package.kind.as_str().to_string())),
      description: Some(package.description.clone()).filter(|d| !d.is_empty()),
    }),
    runtime: project.runtime.as_ref().map(render_ref),
    base: project.base.as_ref().map(render_ref),
    depends: Some(
      project
        .depends
        .iter()
        .map(|d| RawDepend {
          id: Some(d.id.clone()),
          version: d.version.clone().map(Scalar),
          kind: d.kind.clone(),
          source: d.source.as_ref().map(render_source),
          build: d.build.clone().map(RawBuild::Script),
          variables: render_variables(&d.variables),
        })
        .collect(),
    )
    .filter(|d: &Vec<RawDepend>| !d.is_empty()),
    source: project.source.as_ref().map(render_source),
    variables: render_variables(&project.variables),
    build: project.build.clone().map(RawBuild::Script),
  };
  Ok(serde_yaml::to_string(&raw)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn field_of(err: ProjectError) -> String {
    match err {
      ProjectError::MissingField(field) => field,
      ProjectError::InvalidField { field, .. } => field,
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn minimal_descriptor() {
    let project = parse_project("package: {id: org.app, version: 1.0, kind: runtime}\n").unwrap();
    assert_eq!(project.package.version, "1.0");
    assert_eq!(project.package.name, "org.app");
    assert_eq!(project.package.kind, PackageKind::Runtime);
    assert!(project.source.is_none());
    assert!(project.depends.is_empty());
  }

  mod package_kind {
    use super::*;

    #[test]
    fn missing_kind_is_config_error() {
      let err = parse_project("package: {id: org.app, version: 1.0.0}\n").unwrap_err();
      assert_eq!(field_of(err), "package.kind");
    }

    #[test]
    fn empty_kind_is_config_error() {
      let err = parse_project("package: {id: org.app, version: 1.0.0, kind: ''}\n").unwrap_err();
      assert_eq!(field_of(err), "package.kind");
    }

    #[test]
    fn unknown_kind_is_config_error() {
      let err = parse_project("package: {id: org.app, version: 1.0.0, kind: plugin}\n").unwrap_err();
      assert!(matches!(err, ProjectError::InvalidField { ref field, .. } if field == "package.kind"));
    }
  }

  mod source {
    use super::*;

    const HEAD: &str = "package: {id: org.app, version: 1.0.0, kind: app}\n";

    #[test]
    fn archive_requires_digest() {
      let text = format!("{HEAD}source: {{kind: archive, url: 'https://h/a.tar.gz'}}\n");
      assert_eq!(field_of(parse_project(&text).unwrap_err()), "source.digest");
    }

    #[test]
    fn git_requires_url() {
      let text = format!("{HEAD}source: {{kind: git, commit: abc}}\n");
      assert_eq!(field_of(parse_project(&text).unwrap_err()), "source.url");
    }

    #[test]
    fn git_does_not_need_digest() {
      let text = format!("{HEAD}source: {{kind: git, url: 'https://h/r.git', commit: abc, version: 1.2}}\n");
      let source = parse_project(&text).unwrap().source.unwrap();
      assert_eq!(source.kind, SourceKind::Git);
      assert_eq!(source.commit.as_deref(), Some("abc"));
      assert_eq!(source.version.as_deref(), Some("1.2"));
    }

    #[test]
    fn dependency_source_errors_name_the_entry() {
      let text = format!("{HEAD}depends:\n  - id: zlib\n  - id: png\n    source: {{kind: file, url: 'https://h/f'}}\n");
      assert_eq!(field_of(parse_project(&text).unwrap_err()), "depends[1].source.digest");
    }

    #[test]
    fn buildable_dependency_requires_version() {
      let text = format!(
        "{HEAD}depends:\n  - id: zlib\n  - id: libfoo\n    source: {{kind: git, url: 'https://h/foo.git', commit: abc}}\n    build: make install\n"
      );
      assert_eq!(field_of(parse_project(&text).unwrap_err()), "depends[1].version");
    }

    #[test]
    fn prebuilt_dependency_may_omit_version() {
      let text = format!("{HEAD}depends:\n  - id: zlib\n");
      let project = parse_project(&text).unwrap();
      assert_eq!(project.depends[0].version, None);
    }
  }

  #[test]
  fn refs_accept_text_and_mapping() {
    let text = "package: {id: a, version: '1', kind: app}\nruntime: org.rt/23.0/arm64\nbase: {id: org.base, version: 23}\n";
    let project = parse_project(text).unwrap();
    let runtime = project.runtime.unwrap();
    assert_eq!(runtime.version.as_deref(), Some("23.0"));
    assert_eq!(runtime.arch.as_deref(), Some("arm64"));
    let base = project.base.unwrap();
    assert_eq!(base.id, "org.base");
    assert_eq!(base.version.as_deref(), Some("23"));
    assert_eq!(base.arch, None);
  }

  #[test]
  fn variables_keep_declaration_order() {
    let text = "package: {id: a, version: '1', kind: app}\nvariables:\n  zeta: z\n  alpha: 1\n  flag: true\n  empty:\n";
    let project = parse_project(text).unwrap();
    let keys: Vec<&str> = project.variables.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["zeta", "alpha", "flag", "empty"]);
    assert_eq!(project.variables[1].1, "1");
    assert_eq!(project.variables[3].1, "");
  }

  #[test]
  fn invalid_variable_name_is_rejected() {
    let text = "package: {id: a, version: '1', kind: app}\nvariables:\n  'bad-name': x\n";
    assert_eq!(field_of(parse_project(text).unwrap_err()), "variables.bad-name");
  }

  #[test]
  fn manual_build_steps_are_joined() {
    let text = "package: {id: a, version: '1', kind: app}\nbuild:\n  kind: manual\n  manual:\n    configure: ./configure\n    install: make install\n";
    assert_eq!(
      parse_project(text).unwrap().build.as_deref(),
      Some("./configure\nmake install")
    );
  }

  #[test]
  fn syntax_error_is_reported() {
    assert!(matches!(
      parse_project("package: [unclosed\n"),
      Err(ProjectError::Syntax(_))
    ));
  }
}
