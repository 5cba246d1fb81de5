use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use cyklop_core::runner::{
    Scenario, ScenarioBuilder, UserBehavior, UserRegistry, VirtualUser, VuFuture,
};
use serde::{Deserialize, Serialize};

/// A scenario file.
///
/// ```yaml
/// name: smoke
/// baseUrl: http://127.0.0.1:8080
/// defaultUser: Browser
/// users:
///   - name: Browser
///     requests:
///       - path: /hello
///         expectStatus: [200]
///         pause: 100ms
/// steps:
///   - rampUp: 10
///     duration: 5s
///   - holdFor: 30s
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioDoc {
    /// Run directory prefix; defaults to the file stem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Headers sent with every request.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub headers: BTreeMap<String, String>,

    /// Required when more than one user is defined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_user: Option<String>,

    #[serde(default)]
    pub users: Vec<UserYaml>,

    #[serde(default)]
    pub steps: Vec<StepYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct UserYaml {
    pub name: String,

    /// Times the request list is executed by each virtual user.
    #[serde(default = "default_repeat")]
    pub repeat: u64,

    #[serde(default)]
    pub requests: Vec<RequestYaml>,
}

fn default_repeat() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute URL, or a path joined onto the base URL.
    pub path: String,

    /// Name recorded in the results file; defaults to `path`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub headers: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout: Option<YamlDuration>,

    /// Acceptable status codes; any code passes when empty.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub expect_status: Vec<u16>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub expect_headers: BTreeMap<String, String>,

    /// Think time after the request.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pause: Option<YamlDuration>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// One load step. Exactly one of `rampUp`, `jumpTo`, `holdFor` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StepYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_up: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_to: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hold_for: Option<YamlDuration>,

    /// Ramp duration; only valid with `rampUp`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<YamlDuration>,

    /// User behavior for this step instead of the default user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|e| E::custom(format!("invalid duration {v}: {e}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub(crate) async fn load_doc(path: &Path) -> anyhow::Result<ScenarioDoc> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario: {}", path.display()))?;

    serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse scenario YAML: {}", path.display()))
}

/// Step of a loaded scenario, with its user override resolved.
#[derive(Clone)]
pub(crate) enum StepPlan {
    RampUp {
        rate: u64,
        duration: Duration,
        user: Option<Arc<dyn UserBehavior>>,
    },
    JumpTo {
        rate: u64,
        user: Option<Arc<dyn UserBehavior>>,
    },
    HoldFor {
        duration: Duration,
        user: Option<Arc<dyn UserBehavior>>,
    },
}

/// A scenario file with every name resolved against the declared users.
pub(crate) struct YamlScenario {
    name: String,
    default_user: Arc<dyn UserBehavior>,
    steps: Vec<StepPlan>,
}

impl Scenario for YamlScenario {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_user(&self) -> Arc<dyn UserBehavior> {
        self.default_user.clone()
    }

    fn define(&self, plan: &mut ScenarioBuilder) {
        for step in &self.steps {
            let (added, user) = match step {
                StepPlan::RampUp {
                    rate,
                    duration,
                    user,
                } => (plan.ramp_up(*rate, *duration), user),
                StepPlan::JumpTo { rate, user } => (plan.jump_to(*rate), user),
                StepPlan::HoldFor { duration, user } => (plan.hold_for(*duration), user),
            };
            if let Some(user) = user {
                added.with_user(user.clone());
            }
        }
    }
}

pub(crate) struct LoadedScenario {
    pub scenario: YamlScenario,
    pub base_url: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ScenarioDoc {
    /// Builds the runnable scenario. `fallback_name` is used when the file has no `name`.
    pub(crate) fn resolve(self, fallback_name: &str) -> anyhow::Result<LoadedScenario> {
        let ScenarioDoc {
            name,
            base_url,
            headers,
            default_user,
            users,
            steps,
        } = self;

        if users.is_empty() {
            anyhow::bail!("scenario defines no users");
        }

        let mut registry = UserRegistry::new();
        for user in users {
            let script = ScriptUser::from_yaml(user)?;
            registry.register(Arc::new(script))?;
        }

        let default_user = match default_user {
            Some(name) => registry.get(&name).context("invalid `defaultUser`")?,
            None if registry.len() == 1 => {
                let only = registry.names().next().unwrap_or_default().to_string();
                registry.get(&only)?
            }
            None => anyhow::bail!(
                "`defaultUser` is required when more than one user is defined ({})",
                registry.names().collect::<Vec<_>>().join(", ")
            ),
        };

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(idx, step)| {
                resolve_step(step, &registry).with_context(|| format!("invalid step #{}", idx + 1))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(LoadedScenario {
            scenario: YamlScenario {
                name: name.unwrap_or_else(|| fallback_name.to_string()),
                default_user,
                steps,
            },
            base_url: base_url.filter(|s| !s.is_empty()),
            headers: headers.into_iter().collect(),
        })
    }
}

fn resolve_step(step: StepYaml, registry: &UserRegistry) -> anyhow::Result<StepPlan> {
    let user = step
        .user
        .as_deref()
        .map(|name| registry.get(name))
        .transpose()?;

    match (step.ramp_up, step.jump_to, step.hold_for) {
        (Some(rate), None, None) => {
            let duration = step
                .duration
                .context("`rampUp` requires a `duration`")?
                .into_inner();
            Ok(StepPlan::RampUp {
                rate,
                duration,
                user,
            })
        }
        (None, Some(rate), None) => {
            if step.duration.is_some() {
                anyhow::bail!("`duration` is only valid with `rampUp`");
            }
            Ok(StepPlan::JumpTo { rate, user })
        }
        (None, None, Some(duration)) => {
            if step.duration.is_some() {
                anyhow::bail!("`duration` is only valid with `rampUp` (use `holdFor: <duration>`)");
            }
            Ok(StepPlan::HoldFor {
                duration: duration.into_inner(),
                user,
            })
        }
        (None, None, None) => anyhow::bail!("expected one of `rampUp`, `jumpTo`, `holdFor`"),
        _ => anyhow::bail!("only one of `rampUp`, `jumpTo`, `holdFor` may be set per step"),
    }
}

/// Parsed, validated request of a [`ScriptUser`].
#[derive(Debug, Clone)]
struct ScriptRequest {
    method: http::Method,
    path: String,
    name: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    timeout: Option<Duration>,
    expect_status: Vec<u16>,
    expect_headers: Vec<(String, String)>,
    pause: Option<Duration>,
}

/// User behavior that plays a fixed list of requests.
#[derive(Debug)]
pub(crate) struct ScriptUser {
    name: String,
    repeat: u64,
    requests: Arc<[ScriptRequest]>,
}

impl ScriptUser {
    fn from_yaml(user: UserYaml) -> anyhow::Result<Self> {
        let UserYaml {
            name,
            repeat,
            requests,
        } = user;

        if name.trim().is_empty() {
            anyhow::bail!("user name must not be empty");
        }

        let requests = requests
            .into_iter()
            .map(|r| {
                let method = http::Method::from_bytes(r.method.to_ascii_uppercase().as_bytes())
                    .with_context(|| format!("user `{name}`: invalid method `{}`", r.method))?;
                Ok(ScriptRequest {
                    method,
                    path: r.path,
                    name: r.name,
                    headers: r.headers.into_iter().collect(),
                    body: r.body,
                    timeout: r.timeout.map(YamlDuration::into_inner),
                    expect_status: r.expect_status,
                    expect_headers: r.expect_headers.into_iter().collect(),
                    pause: r.pause.map(YamlDuration::into_inner),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            name,
            repeat,
            requests: Arc::from(requests),
        })
    }
}

impl UserBehavior for ScriptUser {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, vu: VirtualUser) -> VuFuture {
        let requests = Arc::clone(&self.requests);
        let repeat = self.repeat;

        Box::pin(async move {
            for _ in 0..repeat {
                for spec in requests.iter() {
                    let mut req = vu.client().request(spec.method.clone(), spec.path.clone());
                    if let Some(name) = &spec.name {
                        req = req.name(name.clone());
                    }
                    for (k, v) in &spec.headers {
                        req = req.header(k.clone(), v.clone());
                    }
                    if let Some(body) = &spec.body {
                        req = req.body(body.clone());
                    }
                    if let Some(timeout) = spec.timeout {
                        req = req.timeout(timeout);
                    }

                    let mut res = req.await;
                    if !spec.expect_status.is_empty() {
                        res.verify_status(&spec.expect_status);
                    }
                    for (k, v) in &spec.expect_headers {
                        res.verify_header(k, v);
                    }
                    res.finish();

                    if let Some(pause) = spec.pause {
                        vu.pause(pause).await;
                    }
                }
            }
            Ok(())
        })
    }
}
