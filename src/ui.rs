use crate::models::{DashboardResponse, TableRow};

pub fn render_index(dashboard: &DashboardResponse) -> String {
    let initial = serde_json::to_string(dashboard)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
        .replace("{{", "{\\u007b");
    let session_label = match &dashboard.session.user {
        Some(user) if dashboard.session.privileged => {
            escape_html(user.email.as_deref().unwrap_or(&user.id))
        }
        _ => "Read only".to_string(),
    };
    INDEX_HTML
        .replace("{{MODE}}", dashboard.mode_label)
        .replace("{{SESSION}}", &session_label)
        .replace("{{TOTAL}}", &escape_html(&dashboard.total_display))
        .replace("{{ROWS}}", &render_rows(&dashboard.rows))
        .replace("{{INITIAL}}", &initial)
}

fn render_rows(rows: &[TableRow]) -> String {
    if rows.is_empty() {
        return r#"<tr><td colspan="4" class="empty">No transactions yet</td></tr>"#.to_string();
    }
    rows.iter().map(render_row).collect::<Vec<_>>().join("\n")
}

fn render_row(row: &TableRow) -> String {
    let id = escape_html(row.id.as_str());
    let actions = if row.editable {
        format!(
            r#"<form method="post" action="/transactions/{id}/delete" onsubmit="return confirm('Delete this transaction?')"><input type="hidden" name="confirm" value="true" /><button class="edit-btn" type="button" data-id="{id}">Edit</button> <button class="del-btn" type="submit">Delete</button></form>"#
        )
    } else {
        r#"<span class="muted">View only</span>"#.to_string()
    };
    let class = if row.amount.is_sign_negative() { "out" } else { "in" };
    format!(
        r#"<tr><td>{date}</td><td>{description}</td><td class="{class}">{amount}</td><td>{actions}</td></tr>"#,
        date = row.date,
        description = escape_html(&row.description),
        amount = escape_html(&row.amount_display),
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '{' => escaped.push_str("&#123;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Family Finance</title>
  <style>
    :root {
      --bg: #f5f3ff;
      --ink: #1f1b2e;
      --accent: rgb(124, 58, 237);
      --accent-soft: rgba(124, 58, 237, 0.2);
      --card: #ffffff;
      --muted: #8b857d;
      --in: #2d7a4b;
      --out: #c63b2b;
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: var(--bg);
      color: var(--ink);
      font-family: "Inter", "Trebuchet MS", sans-serif;
      padding: 32px 18px 48px;
    }

    body.dark {
      --bg: #15121f;
      --ink: #ece9f7;
      --card: #221d33;
    }

    .app {
      width: min(960px, 100%);
      margin: 0 auto;
      display: grid;
      gap: 24px;
    }

    header {
      display: flex;
      flex-wrap: wrap;
      justify-content: space-between;
      align-items: center;
      gap: 12px;
    }

    h1 {
      margin: 0;
      font-size: clamp(1.6rem, 4vw, 2.4rem);
    }

    .card {
      background: var(--card);
      border-radius: 18px;
      padding: 20px;
      box-shadow: 0 12px 32px rgba(31, 27, 46, 0.08);
    }

    .label {
      font-size: 0.8rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: var(--muted);
    }

    .total {
      font-size: 2rem;
      font-weight: 600;
      color: var(--accent);
    }

    .badges {
      display: flex;
      gap: 8px;
      flex-wrap: wrap;
      align-items: center;
    }

    .badge {
      border-radius: 999px;
      padding: 6px 12px;
      background: var(--accent-soft);
      font-size: 0.85rem;
    }

    form.inline {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(160px, 1fr));
      gap: 12px;
    }

    input {
      padding: 10px 12px;
      border-radius: 10px;
      border: 1px solid rgba(31, 27, 46, 0.2);
      font: inherit;
    }

    button {
      border: none;
      border-radius: 999px;
      padding: 10px 16px;
      font: inherit;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
    }

    button.secondary {
      background: transparent;
      color: var(--accent);
      border: 1px solid var(--accent);
    }

    table {
      width: 100%;
      border-collapse: collapse;
    }

    th, td {
      text-align: left;
      padding: 8px;
      border-bottom: 1px solid rgba(31, 27, 46, 0.08);
    }

    td form {
      display: inline;
    }

    td button {
      padding: 4px 10px;
      font-size: 0.8rem;
    }

    .in {
      color: var(--in);
    }

    .out {
      color: var(--out);
    }

    .muted, .empty {
      color: var(--muted);
      font-size: 0.85rem;
    }

    #chart {
      width: 100%;
      height: 260px;
      display: block;
    }

    .chart-line {
      fill: var(--accent-soft);
      stroke: var(--accent);
      stroke-width: 3;
    }

    .chart-point {
      fill: white;
      stroke: var(--accent);
      stroke-width: 2;
    }

    .chart-grid {
      stroke: rgba(31, 27, 46, 0.12);
    }

    .chart-label {
      fill: var(--muted);
      font-size: 11px;
    }

    .status {
      min-height: 1.2em;
      font-size: 0.95rem;
    }

    .status[data-type="error"] {
      color: var(--out);
    }

    .status[data-type="ok"] {
      color: var(--in);
    }

    .hidden {
      display: none;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>Family Finance</h1>
      <div class="badges">
        <span class="badge">Data: <span id="data-mode">{{MODE}}</span></span>
        <span class="badge" id="session-label">{{SESSION}}</span>
        <button class="secondary" id="toggle-mode" type="button">Theme</button>
      </div>
    </header>

    <section class="card">
      <div class="label">Balance</div>
      <div class="total" id="total">{{TOTAL}}</div>
      <svg id="chart" viewBox="0 0 600 260" aria-label="Cumulative balance" role="img"></svg>
    </section>

    <section class="card" id="form-section">
      <div class="label">Add transaction</div>
      <form class="inline" id="add-form" method="post" action="/transactions">
        <input type="date" name="date" id="date" required />
        <input type="text" name="description" id="description" placeholder="Description" />
        <input type="number" step="any" name="amount" id="amount" placeholder="Amount (+ in, - out)" required />
        <button type="submit">Save</button>
        <button class="secondary" type="reset">Clear</button>
      </form>
    </section>

    <section class="card">
      <div class="label">Transactions</div>
      <table>
        <thead>
          <tr><th>Date</th><th>Description</th><th>Amount</th><th></th></tr>
        </thead>
        <tbody id="rows">
{{ROWS}}
        </tbody>
      </table>
    </section>

    <section class="card" id="auth-section">
      <div class="label">Admin</div>
      <form class="inline" id="auth-form">
        <input type="email" id="auth-email" placeholder="Email" />
        <input type="password" id="auth-pass" placeholder="Password (min 6)" />
        <button type="button" id="btn-login">Log in</button>
        <button class="secondary" type="button" id="btn-signup">Sign up</button>
      </form>
      <button class="secondary hidden" type="button" id="btn-logout">Log out</button>
    </section>

    <div class="status" id="status"></div>
  </main>

  <script>
    let current = {{INITIAL}};

    const totalEl = document.getElementById('total');
    const rowsEl = document.getElementById('rows');
    const chartEl = document.getElementById('chart');
    const statusEl = document.getElementById('status');
    const sessionEl = document.getElementById('session-label');
    const authForm = document.getElementById('auth-form');
    const logoutBtn = document.getElementById('btn-logout');
    const formSection = document.getElementById('form-section');

    const setStatus = (message, type) => {
      statusEl.textContent = message;
      statusEl.dataset.type = type || '';
    };

    const request = async (method, url, body) => {
      const options = { method, headers: {} };
      if (body !== undefined) {
        options.headers['content-type'] = 'application/json';
        options.body = JSON.stringify(body);
      }
      const res = await fetch(url, options);
      if (!res.ok) {
        const msg = await res.text();
        throw new Error(msg || 'Request failed');
      }
      return res.status === 204 ? null : res.json();
    };

    const renderChart = (points) => {
      if (!points.length) {
        chartEl.innerHTML = '<text class="chart-label" x="50%" y="50%" text-anchor="middle">No data yet</text>';
        return;
      }

      const width = 600;
      const height = 260;
      const paddingX = 56;
      const paddingY = 34;
      const top = 24;

      const values = points.map((point) => point.balance);
      let min = Math.min(0, ...values);
      let max = Math.max(0, ...values);
      if (min === max) {
        min -= 1;
        max += 1;
      }

      const range = max - min;
      const xStep = points.length > 1 ? (width - paddingX * 2) / (points.length - 1) : 0;
      const scaleY = (height - top - paddingY) / range;
      const x = (index) => paddingX + index * xStep;
      const y = (value) => height - paddingY - (value - min) * scaleY;

      const line = points
        .map((point, index) => `${index === 0 ? 'M' : 'L'} ${x(index).toFixed(2)} ${y(point.balance).toFixed(2)}`)
        .join(' ');
      const area = `${line} L ${x(points.length - 1).toFixed(2)} ${y(0).toFixed(2)} L ${x(0).toFixed(2)} ${y(0).toFixed(2)} Z`;

      const ticks = 4;
      let grid = '';
      for (let i = 0; i <= ticks; i += 1) {
        const value = min + (range * i) / ticks;
        const yPos = y(value);
        grid += `<line class="chart-grid" x1="${paddingX}" y1="${yPos}" x2="${width - paddingX}" y2="${yPos}" />`;
        grid += `<text class="chart-label" x="${paddingX - 8}" y="${yPos + 4}" text-anchor="end">${Math.round(value)}</text>`;
      }

      const labelEvery = Math.max(1, Math.ceil(points.length / 8));
      const labels = points
        .map((point, index) => index % labelEvery === 0
          ? `<text class="chart-label" x="${x(index)}" y="${height - paddingY + 18}" text-anchor="middle">${point.date.slice(5)}</text>`
          : '')
        .join('');
      const circles = points
        .map((point, index) => `<circle class="chart-point" cx="${x(index)}" cy="${y(point.balance)}" r="4" />`)
        .join('');

      chartEl.innerHTML = `${grid}<path class="chart-line" d="${area}" />${circles}${labels}`;
    };

    const renderRows = (rows) => {
      rowsEl.innerHTML = '';
      if (!rows.length) {
        rowsEl.innerHTML = '<tr><td colspan="4" class="empty">No transactions yet</td></tr>';
        return;
      }
      rows.forEach((row) => {
        const tr = document.createElement('tr');
        [row.date, row.description, row.amount_display].forEach((text, index) => {
          const td = document.createElement('td');
          td.textContent = text;
          if (index === 2) {
            td.className = row.amount < 0 ? 'out' : 'in';
          }
          tr.appendChild(td);
        });
        const actions = document.createElement('td');
        if (row.editable) {
          const edit = document.createElement('button');
          edit.textContent = 'Edit';
          edit.type = 'button';
          edit.addEventListener('click', () => editRow(row));
          const del = document.createElement('button');
          del.textContent = 'Delete';
          del.type = 'button';
          del.addEventListener('click', () => deleteRow(row));
          actions.append(edit, ' ', del);
        } else {
          const span = document.createElement('span');
          span.className = 'muted';
          span.textContent = 'View only';
          actions.appendChild(span);
        }
        tr.appendChild(actions);
        rowsEl.appendChild(tr);
      });
    };

    const renderSession = (session) => {
      const user = session.user;
      sessionEl.textContent = session.privileged && user ? (user.email || user.id) : 'Read only';
      authForm.classList.toggle('hidden', session.privileged);
      logoutBtn.classList.toggle('hidden', !session.privileged);
      formSection.classList.toggle('hidden', !session.privileged);
    };

    const render = (data) => {
      current = data;
      totalEl.textContent = data.total_display;
      renderChart(data.series);
      renderRows(data.rows);
      renderSession(data.session);
    };

    const refresh = async () => {
      render(await request('GET', '/api/dashboard'));
    };

    const poll = async () => {
      const data = await request('GET', '/api/dashboard');
      if (!current || data.revision !== current.revision
        || data.session.privileged !== current.session.privileged) {
        render(data);
      }
    };

    const editRow = async (row) => {
      const amount = prompt('Amount (positive = in, negative = out)', row.amount);
      if (amount === null) {
        return;
      }
      const description = prompt('Description', row.description === '-' ? '' : row.description);
      const date = prompt('Date (YYYY-MM-DD)', row.date);
      try {
        await request('PUT', `/api/transactions/${encodeURIComponent(row.id)}`, {
          amount,
          description: description === null ? undefined : description,
          date: date === null ? undefined : date
        });
        await refresh();
      } catch (err) {
        setStatus(err.message, 'error');
      }
    };

    const deleteRow = async (row) => {
      if (!confirm('Delete this transaction?')) {
        return;
      }
      try {
        await request('DELETE', `/api/transactions/${encodeURIComponent(row.id)}?confirm=true`);
        await refresh();
      } catch (err) {
        setStatus(err.message, 'error');
      }
    };

    document.getElementById('add-form').addEventListener('submit', async (event) => {
      event.preventDefault();
      const form = event.target;
      try {
        await request('POST', '/api/transactions', {
          date: form.date.value,
          description: form.description.value,
          amount: form.amount.value
        });
        form.reset();
        await refresh();
        setStatus('Saved', 'ok');
      } catch (err) {
        setStatus(`Failed to add transaction: ${err.message}`, 'error');
      }
    });

    const credentials = () => ({
      email: document.getElementById('auth-email').value.trim(),
      password: document.getElementById('auth-pass').value.trim()
    });

    document.getElementById('btn-login').addEventListener('click', async () => {
      try {
        await request('POST', '/api/auth/login', credentials());
        await refresh();
        setStatus('Logged in', 'ok');
      } catch (err) {
        setStatus(`Login failed: ${err.message}`, 'error');
      }
    });

    document.getElementById('btn-signup').addEventListener('click', async () => {
      try {
        const res = await request('POST', '/api/auth/signup', credentials());
        setStatus(res.message, 'ok');
      } catch (err) {
        setStatus(`Sign up failed: ${err.message}`, 'error');
      }
    });

    logoutBtn.addEventListener('click', async () => {
      try {
        await request('POST', '/api/auth/logout');
        await refresh();
      } catch (err) {
        setStatus(err.message, 'error');
      }
    });

    document.getElementById('toggle-mode').addEventListener('click', () => {
      document.body.classList.toggle('dark');
    });

    if (current) {
      render(current);
    }
    setInterval(() => poll().catch((err) => setStatus(err.message, 'error')), 5000);
  </script>
</body>
</html>
"#;
