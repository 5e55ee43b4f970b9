use crate::calculator::GoalInputs;
use crate::tracker::{Snapshot, TrackerView};

struct Field {
    key: &'static str,
    label: &'static str,
    step: &'static str,
    value: f64,
}

fn field(key: &'static str, label: &'static str, step: &'static str, value: f64) -> Field {
    Field {
        key,
        label,
        step,
        value,
    }
}

fn fields(inputs: &GoalInputs) -> [Field; 8] {
    [
        field("avgLoanAmount", "Average loan amount", "1000", inputs.avg_loan_amount),
        field(
            "annualClosingsDollarGoal",
            "Annual closings goal ($)",
            "100000",
            inputs.annual_closings_dollar_goal,
        ),
        field("pullThroughRate", "Pull-through rate", "0.01", inputs.pull_through_rate),
        field("conversionToApp", "Conversion to app", "0.01", inputs.conversion_to_app),
        field(
            "totalReferralPartners",
            "Referral partners",
            "1",
            f64::from(inputs.total_referral_partners),
        ),
        field("annualIncomeGoal", "Annual income goal ($)", "1000", inputs.annual_income_goal),
        field(
            "avgCommissionBasisPoints",
            "Avg commission (bps)",
            "0.0001",
            inputs.avg_commission_basis_points,
        ),
        field("preQualToAppRate", "Pre-qual to app rate", "0.01", inputs.pre_qual_to_app_rate),
    ]
}

pub fn render_index(view: &TrackerView, history: &[Snapshot]) -> String {
    let field_html: String = fields(&view.inputs)
        .iter()
        .map(|field| {
            format!(
                r#"<label class="field"><span class="label">{}</span><input type="number" min="0" step="{}" name="{}" value="{}" /></label>"#,
                field.label, field.step, field.key, field.value
            )
        })
        .collect();

    let history_html: String = if history.is_empty() {
        r#"<li class="empty">No snapshots yet.</li>"#.to_string()
    } else {
        history
            .iter()
            .enumerate()
            .map(|(index, snapshot)| {
                format!(
                    r#"<li><span>{}</span><span>{} originations</span><button class="btn-link" type="button" data-load="{index}">Load</button></li>"#,
                    snapshot.date.format("%Y-%m-%d %H:%M UTC"),
                    snapshot.calculated.simplified.annual_origination_unit_goal
                )
            })
            .collect()
    };

    let last_saved = view
        .last_saved
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    let state_json = serde_json::to_string(view)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/");

    INDEX_HTML
        .replace("{{FIELDS}}", &field_html)
        .replace("{{HISTORY}}", &history_html)
        .replace("{{LAST_SAVED}}", &last_saved)
        .replace("{{STATE_JSON}}", &state_json)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Goal Tracker</title>
  <style>
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #eef3f8;
      --bg-2: #c9dcef;
      --ink: #1f2a33;
      --accent: #1f7a5a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.88);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #e3ecf5 60%, #f4f7fa 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(980px, 100%);
      background: var(--card);
      backdrop-filter: blur(12px);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 28px;
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      font-size: clamp(2rem, 4vw, 2.6rem);
      margin: 0;
    }

    h2 {
      margin: 0 0 12px;
      font-size: 1.3rem;
    }

    .subtitle {
      margin: 0;
      color: #5f6a72;
    }

    .inputs,
    .results {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 14px;
    }

    .field,
    .stat {
      background: white;
      border-radius: 18px;
      padding: 14px 16px;
      border: 1px solid rgba(47, 72, 88, 0.08);
      display: grid;
      gap: 6px;
    }

    .label {
      font-size: 0.8rem;
      text-transform: uppercase;
      letter-spacing: 0.1em;
      color: #7d878e;
    }

    input {
      font: inherit;
      font-size: 1.2rem;
      border: none;
      border-bottom: 2px solid rgba(47, 72, 88, 0.15);
      padding: 4px 0;
      background: transparent;
    }

    .stat .value {
      font-size: 1.4rem;
      font-weight: 600;
      color: var(--accent-2);
    }

    .actions {
      display: flex;
      flex-wrap: wrap;
      gap: 12px;
    }

    button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 14px 20px;
      font-size: 1rem;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent-2);
      color: white;
    }

    button.primary {
      background: var(--accent);
    }

    .btn-link {
      background: transparent;
      color: var(--accent);
      padding: 4px 10px;
    }

    .history {
      list-style: none;
      margin: 0;
      padding: 0;
      display: grid;
      gap: 8px;
    }

    .history li {
      display: flex;
      justify-content: space-between;
      align-items: center;
      background: white;
      border-radius: 14px;
      padding: 10px 14px;
    }

    .status {
      min-height: 1.2em;
      color: #5f6a72;
    }

    .status[data-type="error"] {
      color: #c63b2b;
    }

    .status[data-type="ok"] {
      color: #2d7a4b;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>Goal Tracker</h1>
      <p class="subtitle">Last saved: <span id="last-saved">{{LAST_SAVED}}</span></p>
    </header>

    <section>
      <h2>Inputs</h2>
      <form id="inputs" class="inputs">{{FIELDS}}</form>
    </section>

    <section>
      <h2>Simplified plan</h2>
      <div class="results" id="simplified"></div>
    </section>

    <section>
      <h2>High-Trust plan</h2>
      <div class="results" id="high-trust"></div>
    </section>

    <section class="actions">
      <form method="post" action="/snapshot" id="snapshot-form">
        <button class="primary" type="submit">Save snapshot</button>
      </form>
      <a href="/api/goals/export.csv"><button type="button">Export CSV</button></a>
      <form method="post" action="/history/clear" id="clear-form">
        <input type="hidden" name="confirm" value="true" />
        <button type="submit">Clear history</button>
      </form>
    </section>

    <section>
      <h2>History</h2>
      <ul class="history" id="history">{{HISTORY}}</ul>
    </section>

    <div class="status" id="status"></div>

    <section id="error-report" hidden>
      <h2>Error analysis</h2>
      <pre></pre>
    </section>
  </main>

  <script>
    const initialState = {{STATE_JSON}};
    const statusEl = document.getElementById('status');
    const lastSavedEl = document.getElementById('last-saved');
    const form = document.getElementById('inputs');
    const reportEl = document.getElementById('error-report');

    const LABELS = {
      simplified: [
        ['annualClosingsUnitGoal', 'Annual closings (units)'],
        ['annualOriginationUnitGoal', 'Annual originations (units)'],
        ['annualOriginationDollarGoal', 'Annual originations ($)'],
        ['monthlyUnitsGoal', 'Monthly units'],
        ['weeklyUnitsGoal', 'Weekly units'],
        ['dailyUnitsGoal', 'Daily units'],
        ['dailyReferredPreQuals', 'Daily referred pre-quals'],
        ['monthlyReferredPreQuals', 'Monthly referred pre-quals'],
        ['minPreQualPerPartner', 'Min pre-quals per partner']
      ],
      highTrust: [
        ['targetClosingsDollarGoal', 'Target closings ($)'],
        ['targetClosingsUnitGoal', 'Target closings (units)'],
        ['annualOriginationUnitGoal', 'Annual originations (units)'],
        ['annualOriginationDollarGoal', 'Annual originations ($)'],
        ['monthlyUnitsGoal', 'Monthly units'],
        ['weeklyUnitsGoal', 'Weekly units'],
        ['dailyUnitsGoal', 'Daily units'],
        ['dailyPreQuals', 'Daily pre-quals'],
        ['monthlyPreQuals', 'Monthly pre-quals'],
        ['minPreQualPerPartner', 'Min pre-quals per partner']
      ]
    };

    const setStatus = (message, type) => {
      statusEl.textContent = message;
      statusEl.dataset.type = type || '';
    };

    const formatValue = (value) => {
      if (typeof value !== 'number' || !Number.isFinite(value)) {
        return '--';
      }
      return Number.isInteger(value) ? value.toLocaleString() : value.toFixed(2);
    };

    const renderPlan = (el, labels, plan) => {
      el.innerHTML = labels
        .map(([key, label]) => `<div class="stat"><span class="label">${label}</span><span class="value">${formatValue(plan[key])}</span></div>`)
        .join('');
    };

    const render = (state) => {
      renderPlan(document.getElementById('simplified'), LABELS.simplified, state.calculated.simplified);
      renderPlan(document.getElementById('high-trust'), LABELS.highTrust, state.calculated.highTrust);
      lastSavedEl.textContent = state.lastSaved || 'never';
    };

    const readInputs = () => {
      const inputs = {};
      form.querySelectorAll('input').forEach((input) => {
        inputs[input.name] = Number(input.value);
      });
      return inputs;
    };

    const save = async () => {
      const res = await fetch('/api/goals/inputs', {
        method: 'PUT',
        headers: { 'content-type': 'application/json' },
        body: JSON.stringify(readInputs())
      });
      if (!res.ok) {
        throw new Error((await res.text()) || 'Request failed');
      }
      render(await res.json());
      setStatus('Saved', 'ok');
      setTimeout(() => setStatus('', ''), 1200);
    };

    form.addEventListener('input', () => {
      save().catch((err) => setStatus(err.message, 'error'));
    });

    document.getElementById('clear-form').addEventListener('submit', (event) => {
      if (!confirm('Clear all saved snapshots?')) {
        event.preventDefault();
      }
    });

    document.getElementById('history').addEventListener('click', async (event) => {
      const index = event.target.dataset.load;
      if (index === undefined) {
        return;
      }
      const res = await fetch(`/api/goals/history/${index}/load`, { method: 'POST' });
      if (!res.ok) {
        setStatus(await res.text(), 'error');
        return;
      }
      window.location.reload();
    });

    const reportError = async (event) => {
      const headers = { 'content-type': 'application/json' };
      const token = localStorage.getItem('token');
      if (token) {
        headers.authorization = `Bearer ${token}`;
      }
      const res = await fetch('/api/error-report', {
        method: 'POST',
        headers,
        body: JSON.stringify({
          error_message: event.message,
          stack: event.error && event.error.stack,
          component_stack: null,
          screenshot: null,
          url: window.location.href
        })
      });
      if (!res.ok) {
        throw new Error((await res.text()) || `Error report failed (${res.status})`);
      }
      const analysis = await res.json();
      reportEl.hidden = false;
      reportEl.querySelector('pre').textContent = JSON.stringify(analysis, null, 2);
      setStatus('Error report sent', 'ok');
    };

    window.addEventListener('error', (event) => {
      reportError(event).catch((err) => setStatus(err.message, 'error'));
    });

    render(initialState);
  </script>
</body>
</html>
"#;
